use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid taxonomic identifier: {0}")]
    InvalidTaxId(String),

    #[error("invalid UniProt accession: {0}")]
    InvalidUniprotId(String),

    #[error("taxonomy file not found: {0}")]
    #[diagnostic(help("run `kira-tax fetch` or point `nodes_file`/`names_file` at a taxdump"))]
    MissingTaxonomyFile(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("setting `{0}` is required for this command")]
    MissingSetting(String),

    #[error("invalid search settings: {0}")]
    InvalidSearchSettings(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid record in {path}: {message}")]
    InvalidRecord { path: String, message: String },

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("uniprot request failed: {0}")]
    UniprotHttp(String),

    #[error("uniprot returned status {status}: {message}")]
    UniprotStatus { status: u16, message: String },

    #[error("taxdump archive is missing {0}")]
    IncompleteTaxdump(String),

    #[error("rank {0:?} has no score under the rank policy")]
    #[diagnostic(help("use `--policy length` for lineages whose common node is unranked"))]
    UnscoredRank(String),

    #[error("identifier is not part of the resolved batch: {0}")]
    UnknownIdentifier(String),
}
