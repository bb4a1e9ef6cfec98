use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ScorePolicy;
use crate::error::KiraError;
use crate::store::{NAMES_FILE, NODES_FILE, Store};
use crate::taxonomy::SearchSettings;

pub const DEFAULT_CONFIG_FILE: &str = "kira-tax.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    /// Directory holding `nodes.dmp` and `names.dmp`.
    #[serde(default)]
    pub taxonomy_dir: Option<String>,
    #[serde(default)]
    pub nodes_file: Option<String>,
    #[serde(default)]
    pub names_file: Option<String>,
    /// UniProt `idmapping.dat`, plain or gzipped.
    #[serde(default)]
    pub idmapping_file: Option<String>,
    #[serde(default)]
    pub ph_table: Option<String>,
    #[serde(default)]
    pub temperature_table: Option<String>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub score: Option<ScorePolicy>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backtrack_bytes: Option<u64>,
    #[serde(default)]
    pub forward_lines: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub nodes_file: Utf8PathBuf,
    pub names_file: Utf8PathBuf,
    pub idmapping_file: Option<Utf8PathBuf>,
    pub ph_table: Option<Utf8PathBuf>,
    pub temperature_table: Option<Utf8PathBuf>,
    pub search: SearchSettings,
    pub score: ScorePolicy,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-tax.json` in the working directory. A missing
    /// default file means built-in defaults; a missing explicit file is an
    /// error.
    pub fn resolve(path: Option<&str>, store: &Store) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            debug!("no config file, using defaults");
            return Self::resolve_config(Config::default(), store);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;
        debug!(path = %config_path.display(), "loaded config");

        Self::resolve_config(config, store)
    }

    pub fn resolve_config(config: Config, store: &Store) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let taxonomy_dir = config
            .taxonomy_dir
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| store.taxonomy_dir());
        let nodes_file = config
            .nodes_file
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| taxonomy_dir.join(NODES_FILE));
        let names_file = config
            .names_file
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| taxonomy_dir.join(NAMES_FILE));

        let defaults = SearchSettings::default();
        let search = SearchSettings {
            backtrack_bytes: config
                .search
                .backtrack_bytes
                .unwrap_or(defaults.backtrack_bytes),
            forward_lines: config.search.forward_lines.unwrap_or(defaults.forward_lines),
            max_depth: config.search.max_depth.unwrap_or(defaults.max_depth),
        };
        search.validate()?;

        Ok(ResolvedConfig {
            schema_version,
            nodes_file,
            names_file,
            idmapping_file: config.idmapping_file.map(Utf8PathBuf::from),
            ph_table: config.ph_table.map(Utf8PathBuf::from),
            temperature_table: config.temperature_table.map(Utf8PathBuf::from),
            search,
            score: config.score.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_into_cache() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/p/.kira-tax"),
            Utf8PathBuf::from("/c/kira-taxonomy"),
        );
        let resolved = ConfigLoader::resolve_config(Config::default(), &store).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.nodes_file, store.nodes_path());
        assert_eq!(resolved.names_file, store.names_path());
        assert_eq!(resolved.search, SearchSettings::default());
        assert_eq!(resolved.score, ScorePolicy::Rank);
    }
}
