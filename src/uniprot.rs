use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{TaxId, UniprotId};
use crate::error::KiraError;
use crate::http;
use crate::lookup::KeyLookup;

/// Accessions per request to the batch endpoint.
pub const BATCH_SIZE: usize = 100;

const FIELDS: &str = "accession,organism_id,xref_pfam";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniprotEntry {
    pub accession: UniprotId,
    pub taxid: Option<TaxId>,
    pub pfam: Vec<String>,
}

pub trait UniprotClient: Send + Sync {
    /// Entries for the requested accessions. Accessions UniProt does not know
    /// are missing from the map.
    fn fetch_entries(
        &self,
        ids: &[UniprotId],
    ) -> Result<BTreeMap<UniprotId, UniprotEntry>, KiraError>;
}

#[derive(Clone)]
pub struct UniprotHttpClient {
    client: Client,
    base_url: String,
}

impl UniprotHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        let headers = http::user_agent_headers().map_err(KiraError::UniprotHttp)?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| KiraError::UniprotHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: "https://rest.uniprot.org".to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn accessions_url(&self) -> String {
        format!("{}/uniprotkb/accessions", self.base_url)
    }
}

impl UniprotClient for UniprotHttpClient {
    fn fetch_entries(
        &self,
        ids: &[UniprotId],
    ) -> Result<BTreeMap<UniprotId, UniprotEntry>, KiraError> {
        let url = self.accessions_url();
        let mut out = BTreeMap::new();
        for batch in ids.chunks(BATCH_SIZE) {
            let accessions = batch
                .iter()
                .map(UniprotId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let response = http::send_with_retries("uniprot", || {
                self.client.get(&url).query(&[
                    ("accessions", accessions.as_str()),
                    ("fields", FIELDS),
                    ("format", "tsv"),
                ])
            })
            .map_err(KiraError::UniprotHttp)?;
            let response = http::check_status(response, "UniProt request failed")
                .map_err(|(status, message)| KiraError::UniprotStatus { status, message })?;
            let body = response
                .text()
                .map_err(|err| KiraError::UniprotHttp(err.to_string()))?;
            let entries = parse_entries_tsv(&body)?;
            debug!(
                requested = batch.len(),
                returned = entries.len(),
                "uniprot batch"
            );
            out.extend(
                entries
                    .into_iter()
                    .map(|entry| (entry.accession.clone(), entry)),
            );
        }
        Ok(out)
    }
}

/// Parses the TSV body of an `accession,organism_id,xref_pfam` query. Columns
/// are located by their header labels.
pub fn parse_entries_tsv(body: &str) -> Result<Vec<UniprotEntry>, KiraError> {
    let mut lines = body.lines();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns = header.split('\t').map(str::trim).collect::<Vec<_>>();
    let position = |label: &str| columns.iter().position(|column| *column == label);
    let (Some(entry_col), Some(taxid_col)) = (position("Entry"), position("Organism (ID)")) else {
        return Err(KiraError::UniprotHttp(format!(
            "unexpected TSV header: {header:?}"
        )));
    };
    let pfam_col = position("Pfam");

    let mut entries = Vec::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let fields = line.split('\t').collect::<Vec<_>>();
        let Some(accession) = fields.get(entry_col).and_then(|v| v.parse::<UniprotId>().ok())
        else {
            warn!(row = line, "skipping uniprot row without a valid accession");
            continue;
        };
        let taxid = fields
            .get(taxid_col)
            .and_then(|value| value.parse::<TaxId>().ok());
        let pfam = pfam_col
            .and_then(|col| fields.get(col))
            .map(|value| {
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        entries.push(UniprotEntry {
            accession,
            taxid,
            pfam,
        });
    }
    Ok(entries)
}

/// Accession to taxid matching through a [`UniprotClient`]. Fetched entries
/// are kept so their Pfam families can be read without a second request.
pub struct UniprotTaxidLookup<'a, C: ?Sized> {
    client: &'a C,
    fetched: RefCell<BTreeMap<UniprotId, UniprotEntry>>,
}

impl<'a, C: UniprotClient + ?Sized> UniprotTaxidLookup<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            fetched: RefCell::new(BTreeMap::new()),
        }
    }

    /// Every entry returned by the lookups done so far.
    pub fn into_entries(self) -> BTreeMap<UniprotId, UniprotEntry> {
        self.fetched.into_inner()
    }
}

impl<C: UniprotClient + ?Sized> KeyLookup for UniprotTaxidLookup<'_, C> {
    fn lookup(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, Option<String>>, KiraError> {
        let parsed = keys
            .iter()
            .filter_map(|key| key.parse::<UniprotId>().ok().map(|id| (key, id)))
            .collect::<Vec<_>>();
        let ids = parsed.iter().map(|(_, id)| id.clone()).collect::<Vec<_>>();
        let entries = self.client.fetch_entries(&ids)?;

        let mut out: BTreeMap<String, Option<String>> =
            keys.iter().map(|key| (key.clone(), None)).collect();
        for (key, id) in parsed {
            if let Some(taxid) = entries.get(&id).and_then(|entry| entry.taxid) {
                out.insert(key.clone(), Some(taxid.to_string()));
            }
        }
        self.fetched.borrow_mut().extend(entries);
        Ok(out)
    }

    fn source(&self) -> String {
        "UniProt".to_string()
    }
}
