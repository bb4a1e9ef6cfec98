use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

static UNIPROT_ACCESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[OPQ][0-9][A-Z0-9]{3}[0-9]|[A-NR-Z][0-9](?:[A-Z][A-Z0-9]{2}[0-9]){1,2})$")
        .expect("uniprot accession pattern is valid")
});

/// NCBI taxonomy node identifier. The root of the tree is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(u64);

impl TaxId {
    pub const ROOT: TaxId = TaxId(1);

    pub fn new(value: u64) -> Result<Self, KiraError> {
        if value == 0 {
            return Err(KiraError::InvalidTaxId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KiraError::InvalidTaxId(value.to_string()));
        }
        let parsed = trimmed
            .parse::<u64>()
            .map_err(|_| KiraError::InvalidTaxId(value.to_string()))?;
        Self::new(parsed).map_err(|_| KiraError::InvalidTaxId(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniprotId(String);

impl UniprotId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniprotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UniprotId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !UNIPROT_ACCESSION.is_match(&normalized) {
            return Err(KiraError::InvalidUniprotId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// How the caller identified the organisms of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    TaxId,
    Organism,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScorePolicy {
    /// Fixed score per rank of the common ancestor.
    #[default]
    Rank,
    /// Mean number of nodes between the common ancestor and each leaf.
    Length,
}

impl fmt::Display for ScorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorePolicy::Rank => write!(f, "rank"),
            ScorePolicy::Length => write!(f, "length"),
        }
    }
}

/// Normalizes an organism name to its binomial form, e.g. `"Escherichia coli"`.
///
/// Underscore-separated names are split on underscores, strain designations past
/// the second word are dropped, and the result is lowercased with only the first
/// character capitalized.
pub fn normalize_organism_name(organism: &str) -> String {
    let whitespace_parts = organism.split_whitespace().count();
    let underscore_parts = organism.split('_').count();
    let spaced;
    let source = if whitespace_parts < underscore_parts {
        spaced = organism.replace('_', " ");
        spaced.as_str()
    } else {
        organism
    };

    let binomial = source
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut chars = binomial.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_taxid_trims_whitespace() {
        let id: TaxId = " 562\t".parse().unwrap();
        assert_eq!(id.get(), 562);
    }

    #[test]
    fn parse_taxid_rejects_zero_and_garbage() {
        assert_matches!("0".parse::<TaxId>(), Err(KiraError::InvalidTaxId(_)));
        assert_matches!("-5".parse::<TaxId>(), Err(KiraError::InvalidTaxId(_)));
        assert_matches!("None".parse::<TaxId>(), Err(KiraError::InvalidTaxId(_)));
    }

    #[test]
    fn normalize_drops_strain() {
        assert_eq!(
            normalize_organism_name("Escherichia coli K-12 substr. MG1655"),
            "Escherichia coli"
        );
    }
}
