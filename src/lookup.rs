use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::error::KiraError;

/// Record matching between identifiers of two kinds.
pub trait KeyLookup {
    /// Every requested key is present in the result; keys without a match map
    /// to `None`.
    fn lookup(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, Option<String>>, KiraError>;

    /// Human readable origin of the values, used in error messages.
    fn source(&self) -> String;
}

/// Looks values up and parses them. A value that does not parse is an error.
pub fn lookup_values<T>(
    lookup: &dyn KeyLookup,
    keys: &BTreeSet<String>,
) -> Result<BTreeMap<String, Option<T>>, KiraError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup
        .lookup(keys)?
        .into_iter()
        .map(|(key, value)| {
            let parsed = value
                .map(|raw| {
                    raw.parse::<T>().map_err(|err| KiraError::InvalidRecord {
                        path: lookup.source(),
                        message: format!("value {raw:?} for {key}: {err}"),
                    })
                })
                .transpose()?;
            Ok((key, parsed))
        })
        .collect()
}

/// A delimited text table with one key column and one value column, optionally
/// gzip compressed. When a key occurs on several rows the last one wins.
#[derive(Debug, Clone)]
pub struct DelimitedFile {
    path: PathBuf,
    key_column: usize,
    value_column: usize,
    delimiter: char,
    has_header: bool,
    filter: Option<(usize, String)>,
}

impl DelimitedFile {
    pub fn tsv(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key_column: 0,
            value_column: 1,
            delimiter: '\t',
            has_header: false,
            filter: None,
        }
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_columns(mut self, key_column: usize, value_column: usize) -> Self {
        self.key_column = key_column;
        self.value_column = value_column;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Only rows whose `column` equals `value` are considered, e.g. the
    /// `NCBI_TaxID` rows of a UniProt `idmapping.dat`.
    pub fn with_filter(mut self, column: usize, value: impl Into<String>) -> Self {
        self.filter = Some((column, value.into()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> Result<Box<dyn BufRead>, KiraError> {
        let file = File::open(&self.path).map_err(|err| {
            KiraError::Filesystem(format!("open {}: {err}", self.path.display()))
        })?;
        let gzipped = self
            .path
            .extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false);
        if gzipped {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }

    fn matches_filter(&self, fields: &[&str]) -> bool {
        match &self.filter {
            Some((column, expected)) => fields
                .get(*column)
                .map(|v| v.trim() == expected.as_str())
                .unwrap_or(false),
            None => true,
        }
    }
}

impl DelimitedFile {
    /// Calls `visit` with the trimmed key and value of every row that passes
    /// the filter. Returns how many rows were too short to carry both columns.
    fn for_each_row(&self, mut visit: impl FnMut(&str, &str)) -> Result<usize, KiraError> {
        let mut reader = self.open_reader()?;
        let mut line = String::new();
        let mut line_no = 0usize;
        let mut skipped = 0usize;
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            if line_no == 1 && self.has_header {
                continue;
            }
            let row = line.trim_end_matches(['\n', '\r']);
            if row.is_empty() {
                continue;
            }
            let fields = row.split(self.delimiter).collect::<Vec<_>>();
            let (Some(key), Some(value)) = (
                fields.get(self.key_column).map(|v| v.trim()),
                fields.get(self.value_column).map(|v| v.trim()),
            ) else {
                skipped += 1;
                continue;
            };
            if !self.matches_filter(&fields) {
                continue;
            }
            visit(key, value);
        }
        Ok(skipped)
    }

    /// Collects every non-empty value per key, in file order. Keys with no
    /// matching row map to an empty list.
    pub fn lookup_all(
        &self,
        keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<String>>, KiraError> {
        let mut out: BTreeMap<String, Vec<String>> =
            keys.iter().map(|key| (key.clone(), Vec::new())).collect();
        if keys.is_empty() {
            return Ok(out);
        }

        let skipped = self.for_each_row(|key, value| {
            if value.is_empty() {
                return;
            }
            if let Some(values) = out.get_mut(key) {
                values.push(value.to_string());
            }
        })?;

        debug!(
            path = %self.path.display(),
            requested = keys.len(),
            found = out.values().map(Vec::len).sum::<usize>(),
            skipped,
            "delimited multi-value lookup"
        );
        Ok(out)
    }
}

impl KeyLookup for DelimitedFile {
    fn lookup(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, Option<String>>, KiraError> {
        let mut out: BTreeMap<String, Option<String>> =
            keys.iter().map(|key| (key.clone(), None)).collect();
        if keys.is_empty() {
            return Ok(out);
        }

        let skipped = self.for_each_row(|key, value| {
            if let Some(slot) = out.get_mut(key) {
                *slot = (!value.is_empty()).then(|| value.to_string());
            }
        })?;

        debug!(
            path = %self.path.display(),
            requested = keys.len(),
            found = out.values().filter(|v| v.is_some()).count(),
            skipped,
            "delimited lookup"
        );
        Ok(out)
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn keys(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn header_is_skipped_and_missing_keys_are_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "organism\tph").unwrap();
        writeln!(file, "Escherichia coli\t7.0").unwrap();
        let table = DelimitedFile::tsv(file.path()).with_header(true);

        let found = table.lookup(&keys(&["Escherichia coli", "organism", "Homo sapiens"])).unwrap();
        assert_eq!(found["Escherichia coli"].as_deref(), Some("7.0"));
        assert_eq!(found["organism"], None);
        assert_eq!(found["Homo sapiens"], None);
    }

    #[test]
    fn filter_selects_mapping_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "P0A7V8\tGene_Name\trpsD").unwrap();
        writeln!(file, "P0A7V8\tNCBI_TaxID\t83333").unwrap();
        let table = DelimitedFile::tsv(file.path())
            .with_columns(0, 2)
            .with_filter(1, "NCBI_TaxID");

        let found = table.lookup(&keys(&["P0A7V8"])).unwrap();
        assert_eq!(found["P0A7V8"].as_deref(), Some("83333"));
    }
}
