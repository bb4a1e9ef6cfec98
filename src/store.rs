use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const NODES_FILE: &str = "nodes.dmp";
pub const NAMES_FILE: &str = "names.dmp";

/// On-disk layout: a per-project root for annotation output and a per-user
/// cache root holding the shared taxonomy dump.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, KiraError> {
        let cwd = std::env::current_dir().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(".kira-tax"))
            .map_err(|_| KiraError::Filesystem("invalid project path".to_string()))?;

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-taxonomy"))
                    .ok()
            })
            .ok_or_else(|| {
                KiraError::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn taxonomy_dir(&self) -> Utf8PathBuf {
        self.cache_root.join("taxonomy")
    }

    pub fn nodes_path(&self) -> Utf8PathBuf {
        self.taxonomy_dir().join(NODES_FILE)
    }

    pub fn names_path(&self) -> Utf8PathBuf {
        self.taxonomy_dir().join(NAMES_FILE)
    }

    pub fn taxonomy_metadata_path(&self) -> Utf8PathBuf {
        self.cache_root.join("metadata").join("taxonomy.json")
    }

    pub fn project_annotation_path(&self, name: &str) -> Utf8PathBuf {
        self.project_root
            .join("annotations")
            .join(format!("{name}.tsv"))
    }

    pub fn ensure_cache_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn taxonomy_present(&self) -> bool {
        self.nodes_path().as_std_path().is_file() && self.names_path().as_std_path().is_file()
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), KiraError> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_metadata(path: &Utf8Path) -> Result<Option<Metadata>, KiraError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let metadata = serde_json::from_str(&content)
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))?;
        Ok(Some(metadata))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kira-tax-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Moves a finished file into place, replacing whatever was there.
    pub fn replace_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), KiraError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        fs::rename(source.as_std_path(), dest.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("move {source} -> {dest}: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub dataset_type: String,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/work/.kira-tax"),
            Utf8PathBuf::from("/home/me/.cache/kira-taxonomy"),
        );
        assert!(store.nodes_path().ends_with("taxonomy/nodes.dmp"));
        assert!(store.names_path().ends_with("taxonomy/names.dmp"));
        assert!(store.taxonomy_metadata_path().ends_with("metadata/taxonomy.json"));
        assert!(
            store
                .project_annotation_path("run")
                .ends_with("annotations/run.tsv")
        );
    }
}
