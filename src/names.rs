use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::TaxId;
use crate::error::KiraError;

pub const SCIENTIFIC_NAME: &str = "scientific name";

/// Translates between taxonomy node ids and display names.
pub trait NameResolver {
    /// Scientific names for `ids`. Ids without one are left out of the map.
    fn resolve_names(&self, ids: &BTreeSet<TaxId>) -> Result<HashMap<TaxId, String>, KiraError>;

    /// Node ids for organism names. A scientific-name match wins over any other
    /// name class; names without a match are left out of the map.
    fn resolve_taxids(&self, names: &BTreeSet<String>)
    -> Result<HashMap<String, TaxId>, KiraError>;
}

/// NCBI `names.dmp`: `tax_id | name | unique name | name class |`.
#[derive(Debug, Clone)]
pub struct NamesFile {
    path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRow<'a> {
    pub taxid: TaxId,
    pub name: &'a str,
    pub class: &'a str,
}

impl NamesFile {
    pub fn open(path: &Path) -> Result<Self, KiraError> {
        if !path.exists() {
            return Err(KiraError::MissingTaxonomyFile(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(&self, mut visit: impl FnMut(NameRow<'_>)) -> Result<(), KiraError> {
        let file = File::open(&self.path)
            .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", self.path.display())))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            if read == 0 {
                break;
            }
            if let Some(row) = parse_name_row(&line) {
                visit(row);
            }
        }
        Ok(())
    }
}

pub fn parse_name_row(line: &str) -> Option<NameRow<'_>> {
    let mut fields = line.split('|').map(str::trim);
    let taxid = fields.next()?.parse::<TaxId>().ok()?;
    let name = fields.next()?;
    let _unique = fields.next()?;
    let class = fields.next()?;
    Some(NameRow { taxid, name, class })
}

impl NameResolver for NamesFile {
    fn resolve_names(&self, ids: &BTreeSet<TaxId>) -> Result<HashMap<TaxId, String>, KiraError> {
        let mut out = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(out);
        }
        self.scan(|row| {
            if row.class == SCIENTIFIC_NAME && ids.contains(&row.taxid) {
                out.entry(row.taxid).or_insert_with(|| row.name.to_string());
            }
        })?;
        debug!(requested = ids.len(), resolved = out.len(), "resolved node names");
        Ok(out)
    }

    fn resolve_taxids(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, TaxId>, KiraError> {
        let mut matches: HashMap<String, (TaxId, bool)> = HashMap::with_capacity(names.len());
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        self.scan(|row| {
            if !names.contains(row.name) {
                return;
            }
            let scientific = row.class == SCIENTIFIC_NAME;
            match matches.get_mut(row.name) {
                Some(existing) if !existing.1 && scientific => *existing = (row.taxid, true),
                Some(_) => {}
                None => {
                    matches.insert(row.name.to_string(), (row.taxid, scientific));
                }
            }
        })?;
        debug!(
            requested = names.len(),
            resolved = matches.len(),
            "resolved organism taxids"
        );
        Ok(matches
            .into_iter()
            .map(|(name, (taxid, _))| (name, taxid))
            .collect())
    }
}
