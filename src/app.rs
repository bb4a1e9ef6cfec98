use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{InputKind, ScorePolicy, TaxId, UniprotId, normalize_organism_name};
use crate::error::KiraError;
use crate::fs_util;
use crate::lookup::{DelimitedFile, lookup_values};
use crate::names::NamesFile;
use crate::ncbi::NcbiClient;
use crate::output;
use crate::store::{Metadata, NAMES_FILE, NODES_FILE, Store};
use crate::taxonomy::{
    BestPairs, DistanceEngine, DistanceResult, Lineage, LineageBuilder, LineageStatus,
    LineageStore, SessionStats, UNKNOWN,
};
use crate::uniprot::{UniprotClient, UniprotTaxidLookup};

/// UniProt id-mapping rows are `accession, id type, value`.
const IDMAPPING_TAXID: &str = "NCBI_TaxID";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    /// `present`, `download` or `planned`.
    pub action: String,
    pub source: String,
    pub nodes_path: String,
    pub names_path: String,
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageReport {
    pub identifier: String,
    pub taxid: Option<TaxId>,
    pub status: LineageStatus,
    pub domain: String,
    pub lineage: Lineage,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineagesResult {
    pub kind: InputKind,
    pub lineages: Vec<LineageReport>,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub identifier: String,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainsResult {
    pub kind: InputKind,
    pub domains: Vec<DomainReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistanceRequest {
    Pair(String, String),
    All,
    Min,
    Max,
    Closest(String),
    Farthest(String),
}

impl DistanceRequest {
    fn targets(&self) -> Vec<&str> {
        match self {
            DistanceRequest::Pair(a, b) => vec![a.as_str(), b.as_str()],
            DistanceRequest::Closest(target) | DistanceRequest::Farthest(target) => {
                vec![target.as_str()]
            }
            DistanceRequest::All | DistanceRequest::Min | DistanceRequest::Max => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum DistanceReport {
    Pair {
        first: String,
        second: String,
        policy: ScorePolicy,
        result: DistanceResult,
    },
    All {
        policy: ScorePolicy,
        distances: BTreeMap<String, BTreeMap<String, DistanceResult>>,
    },
    Best {
        extreme: String,
        target: Option<String>,
        policy: ScorePolicy,
        best: BestPairs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxidSource {
    /// The configured UniProt id-mapping file.
    Local,
    /// The UniProt REST service; also yields Pfam domains.
    Remote,
}

#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    pub source: TaxidSource,
    pub output: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotationRecord {
    pub uid: String,
    pub taxid: Option<TaxId>,
    pub organism: Option<String>,
    pub superkingdom: Option<String>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub pfam: Option<Vec<String>>,
    pub lineage: Option<Lineage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotationResult {
    pub records: Vec<AnnotationRecord>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessionsReport {
    pub taxid: String,
    pub accessions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessionsResult {
    pub reports: Vec<AccessionsReport>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<N: NcbiClient, U: UniprotClient> {
    store: Store,
    config: ResolvedConfig,
    ncbi: N,
    uniprot: U,
}

impl<N: NcbiClient, U: UniprotClient> App<N, U> {
    pub fn new(store: Store, config: ResolvedConfig, ncbi: N, uniprot: U) -> Self {
        Self {
            store,
            config,
            ncbi,
            uniprot,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Downloads the NCBI taxonomy dump and installs `nodes.dmp` and
    /// `names.dmp` into the cache.
    pub fn fetch_taxonomy(
        &self,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KiraError> {
        let nodes_path = self.store.nodes_path();
        let names_path = self.store.names_path();
        let result = |action: &str, bytes| FetchResult {
            action: action.to_string(),
            source: "ncbi".to_string(),
            nodes_path: nodes_path.to_string(),
            names_path: names_path.to_string(),
            bytes,
        };

        sink.event(ProgressEvent {
            message: "phase=Resolve; checking taxonomy cache".to_string(),
            elapsed: None,
        });
        if !options.force && self.store.taxonomy_present() {
            sink.event(ProgressEvent {
                message: "phase=Store; taxonomy already cached".to_string(),
                elapsed: None,
            });
            return Ok(result("present", None));
        }
        if options.dry_run {
            return Ok(result("planned", None));
        }

        self.store.ensure_cache_root()?;
        let temp_dir = tempfile::Builder::new()
            .prefix("kira-tax-taxdump")
            .tempdir_in(self.store.cache_root().as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let zip_path = temp_dir.path().join("taxdmp.zip");

        sink.event(ProgressEvent {
            message: "ncbi.request".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let download = self.ncbi.download_taxdump(&zip_path)?;
        sink.event(ProgressEvent {
            message: format!("ncbi.response bytes={}", download.bytes),
            elapsed: Some(start.elapsed()),
        });
        if !zip_path.exists() {
            return Err(KiraError::Filesystem(format!(
                "taxdump download missing file: {}",
                zip_path.display()
            )));
        }

        sink.event(ProgressEvent {
            message: "phase=Verify; validating archive".to_string(),
            elapsed: None,
        });
        let entries = fs_util::validate_zip(&zip_path)?;
        info!(entries = entries.len(), "taxdump archive validated");

        sink.event(ProgressEvent {
            message: "phase=Extract; unpacking nodes and names".to_string(),
            elapsed: None,
        });
        let staging = temp_dir.path().join("taxonomy");
        fs_util::extract_members(&zip_path, &staging, &[NODES_FILE, NAMES_FILE])?;
        for (member, dest) in [(NODES_FILE, &nodes_path), (NAMES_FILE, &names_path)] {
            let source = Utf8PathBuf::from_path_buf(staging.join(member))
                .map_err(|_| KiraError::Filesystem("invalid temp dir".to_string()))?;
            Store::replace_file(&source, dest)?;
        }

        let metadata = Metadata {
            source: crate::ncbi::TAXDUMP_URL.to_string(),
            dataset_type: "taxonomy".to_string(),
            downloaded_at: iso_timestamp(),
            tool: format!("kira-tax/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: self.store.taxonomy_dir().to_string(),
            files: vec![NODES_FILE.to_string(), NAMES_FILE.to_string()],
        };
        Store::write_metadata(&self.store.taxonomy_metadata_path(), &metadata)?;
        sink.event(ProgressEvent {
            message: "phase=Store; taxonomy installed".to_string(),
            elapsed: Some(start.elapsed()),
        });

        Ok(result("download", Some(download.bytes)))
    }

    /// Opens a fresh resolution session over the configured taxonomy files.
    pub fn open_session(&self) -> Result<(LineageBuilder<BufReader<File>>, NamesFile), KiraError> {
        let builder = LineageBuilder::open(self.config.nodes_file.as_std_path(), self.config.search)?;
        let names = NamesFile::open(self.config.names_file.as_std_path())?;
        Ok((builder, names))
    }

    pub fn resolve<S: AsRef<str>>(
        &self,
        kind: InputKind,
        identifiers: &[S],
        sink: &dyn ProgressSink,
    ) -> Result<(LineageStore, SessionStats), KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} identifiers", identifiers.len()),
            elapsed: None,
        });
        let start = Instant::now();
        let (mut builder, names) = self.open_session()?;
        let store = LineageStore::resolve(&mut builder, &names, kind, identifiers)?;
        let stats = builder.stats();
        info!(
            lineages = store.len(),
            seeks = stats.index.seeks,
            fallback_scans = stats.index.fallback_scans,
            "batch resolved"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} lineages", store.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok((store, stats))
    }

    pub fn lineages<S: AsRef<str>>(
        &self,
        kind: InputKind,
        identifiers: &[S],
        sink: &dyn ProgressSink,
    ) -> Result<LineagesResult, KiraError> {
        let (store, stats) = self.resolve(kind, identifiers, sink)?;
        let lineages = store
            .lineages()
            .map(|(identifier, lineage)| LineageReport {
                identifier: identifier.to_string(),
                taxid: match kind {
                    InputKind::TaxId => identifier.parse().ok(),
                    InputKind::Organism => store.taxid_of(identifier),
                },
                status: lineage.status(),
                domain: lineage.domain().to_string(),
                lineage: lineage.clone(),
            })
            .collect();
        Ok(LineagesResult {
            kind,
            lineages,
            stats,
        })
    }

    pub fn domains<S: AsRef<str>>(
        &self,
        kind: InputKind,
        identifiers: &[S],
        sink: &dyn ProgressSink,
    ) -> Result<DomainsResult, KiraError> {
        let (store, _) = self.resolve(kind, identifiers, sink)?;
        let domains = store
            .identifiers()
            .iter()
            .map(|identifier| DomainReport {
                identifier: identifier.clone(),
                domain: store.domain_of(identifier),
            })
            .collect();
        Ok(DomainsResult { kind, domains })
    }

    /// Runs one distance query. Identifiers named by the query join the batch
    /// when they are not part of it already.
    pub fn distance<S: AsRef<str>>(
        &self,
        kind: InputKind,
        identifiers: &[S],
        request: &DistanceRequest,
        policy: Option<ScorePolicy>,
        sink: &dyn ProgressSink,
    ) -> Result<DistanceReport, KiraError> {
        let policy = policy.unwrap_or(self.config.score);
        let mut batch = identifiers
            .iter()
            .map(|id| id.as_ref().to_string())
            .collect::<Vec<_>>();
        batch.extend(request.targets().into_iter().map(str::to_string));

        let (store, _) = self.resolve(kind, batch.as_slice(), sink)?;
        let engine = DistanceEngine::new(&store, policy);
        sink.event(ProgressEvent {
            message: format!("phase=Score; policy={policy}"),
            elapsed: None,
        });

        let report = match request {
            DistanceRequest::Pair(first, second) => DistanceReport::Pair {
                first: first.clone(),
                second: second.clone(),
                policy,
                result: engine.pairwise(first, second)?,
            },
            DistanceRequest::All => DistanceReport::All {
                policy,
                distances: engine.all_pairs()?,
            },
            DistanceRequest::Min => best("min", None, policy, engine.min_overall()?),
            DistanceRequest::Max => best("max", None, policy, engine.max_overall()?),
            DistanceRequest::Closest(target) => {
                best("closest", Some(target), policy, engine.closest(target)?)
            }
            DistanceRequest::Farthest(target) => {
                best("farthest", Some(target), policy, engine.farthest(target)?)
            }
        };
        Ok(report)
    }

    /// Collects taxonomy and growth properties for UniProt accessions.
    pub fn annotate<S: AsRef<str>>(
        &self,
        uids: &[S],
        options: AnnotateOptions,
        sink: &dyn ProgressSink,
    ) -> Result<AnnotationResult, KiraError> {
        let mut records = Vec::with_capacity(uids.len());
        let mut accessions = BTreeSet::new();
        for raw in uids {
            let raw = raw.as_ref();
            match raw.parse::<UniprotId>() {
                Ok(id) => {
                    accessions.insert(id);
                }
                Err(err) => {
                    warn!(uid = raw, %err, "skipping invalid accession");
                    records.push(AnnotationRecord {
                        uid: raw.to_string(),
                        ..AnnotationRecord::default()
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} accessions", accessions.len()),
            elapsed: None,
        });
        let (taxids, pfam) = self.accession_taxids(&accessions, options.source)?;

        let (mut builder, names) = self.open_session()?;
        let taxid_keys = taxids
            .values()
            .flatten()
            .map(|id| id.to_string())
            .collect::<Vec<_>>();
        let store = LineageStore::from_taxids(&mut builder, &names, &taxid_keys)?;

        let organisms = taxids
            .values()
            .flatten()
            .filter_map(|id| store.name_of(*id))
            .map(normalize_organism_name)
            .collect::<BTreeSet<_>>();
        let ph = self.organism_table(self.config.ph_table.as_deref(), &organisms)?;
        let temperature =
            self.organism_table(self.config.temperature_table.as_deref(), &organisms)?;

        for accession in &accessions {
            let taxid = taxids.get(accession).copied().flatten();
            let lineage = taxid
                .and_then(|id| store.lineage_by_id(id))
                .filter(|lineage| !lineage.is_unknown())
                .cloned();
            let organism = taxid
                .and_then(|id| store.name_of(id))
                .map(normalize_organism_name);
            let superkingdom = lineage
                .as_ref()
                .map(|lineage| lineage.domain().to_string())
                .filter(|domain| domain != UNKNOWN);
            let property = |table: &BTreeMap<String, Option<f64>>| {
                organism
                    .as_ref()
                    .and_then(|name| table.get(name).copied().flatten())
            };
            let (ph, temperature) = (property(&ph), property(&temperature));
            records.push(AnnotationRecord {
                uid: accession.to_string(),
                taxid,
                ph,
                temperature,
                organism,
                superkingdom,
                pfam: pfam.as_ref().map(|map| map.get(accession).cloned().unwrap_or_default()),
                lineage,
            });
        }
        records.sort_by(|a, b| a.uid.cmp(&b.uid));

        let output = match options.output {
            Some(path) => {
                write_annotation_file(&path, &records)?;
                sink.event(ProgressEvent {
                    message: format!("phase=Store; wrote {path}"),
                    elapsed: None,
                });
                Some(path.to_string())
            }
            None => None,
        };
        Ok(AnnotationResult { records, output })
    }

    /// UniProt accessions the id-mapping file assigns to each taxid, in file
    /// order. Reports follow the input order without repeats; an invalid
    /// taxid gets an empty report.
    pub fn accessions<S: AsRef<str>>(&self, taxids: &[S]) -> Result<AccessionsResult, KiraError> {
        let path = self
            .config
            .idmapping_file
            .as_ref()
            .ok_or_else(|| KiraError::MissingSetting("idmapping_file".to_string()))?;

        let mut order = Vec::with_capacity(taxids.len());
        let mut keys = BTreeSet::new();
        for raw in taxids {
            let raw = raw.as_ref().trim();
            let key = match raw.parse::<TaxId>() {
                Ok(id) => {
                    let key = id.to_string();
                    keys.insert(key.clone());
                    key
                }
                Err(err) => {
                    warn!(taxid = raw, %err, "skipping invalid taxid");
                    raw.to_string()
                }
            };
            if !order.contains(&key) {
                order.push(key);
            }
        }

        let table = DelimitedFile::tsv(path.as_std_path())
            .with_columns(2, 0)
            .with_filter(1, IDMAPPING_TAXID);
        let mut found = table.lookup_all(&keys)?;
        let reports = order
            .into_iter()
            .map(|taxid| AccessionsReport {
                accessions: found.remove(&taxid).unwrap_or_default(),
                taxid,
            })
            .collect();
        Ok(AccessionsResult { reports })
    }

    #[allow(clippy::type_complexity)]
    fn accession_taxids(
        &self,
        accessions: &BTreeSet<UniprotId>,
        source: TaxidSource,
    ) -> Result<
        (
            BTreeMap<UniprotId, Option<TaxId>>,
            Option<BTreeMap<UniprotId, Vec<String>>>,
        ),
        KiraError,
    > {
        match source {
            TaxidSource::Remote => {
                let lookup = UniprotTaxidLookup::new(&self.uniprot);
                let keys = accessions.iter().map(|id| id.to_string()).collect();
                let found = lookup_values::<TaxId>(&lookup, &keys)?;
                let taxids = accessions
                    .iter()
                    .map(|id| (id.clone(), found.get(id.as_str()).copied().flatten()))
                    .collect();
                let pfam = lookup
                    .into_entries()
                    .into_iter()
                    .map(|(id, entry)| {
                        let mut families = entry.pfam;
                        families.sort();
                        families.dedup();
                        (id, families)
                    })
                    .collect();
                Ok((taxids, Some(pfam)))
            }
            TaxidSource::Local => {
                let path = self
                    .config
                    .idmapping_file
                    .as_ref()
                    .ok_or_else(|| KiraError::MissingSetting("idmapping_file".to_string()))?;
                let table = DelimitedFile::tsv(path.as_std_path())
                    .with_columns(0, 2)
                    .with_filter(1, IDMAPPING_TAXID);
                let keys = accessions.iter().map(|id| id.to_string()).collect();
                let found = lookup_values::<TaxId>(&table, &keys)?;
                let taxids = accessions
                    .iter()
                    .map(|id| (id.clone(), found.get(id.as_str()).copied().flatten()))
                    .collect();
                Ok((taxids, None))
            }
        }
    }

    fn organism_table(
        &self,
        path: Option<&Utf8Path>,
        organisms: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Option<f64>>, KiraError> {
        match path {
            Some(path) => {
                let table = DelimitedFile::tsv(path.as_std_path()).with_header(true);
                lookup_values::<f64>(&table, organisms)
            }
            None => Ok(BTreeMap::new()),
        }
    }
}

fn best(extreme: &str, target: Option<&String>, policy: ScorePolicy, best: BestPairs) -> DistanceReport {
    DistanceReport::Best {
        extreme: extreme.to_string(),
        target: target.cloned(),
        policy,
        best,
    }
}

fn write_annotation_file(path: &Utf8Path, records: &[AnnotationRecord]) -> Result<(), KiraError> {
    let mut buffer = Vec::new();
    output::write_annotation_tsv(&mut buffer, records)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Store::write_bytes_atomic(path, &buffer)
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
