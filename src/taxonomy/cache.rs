use std::collections::HashMap;
use std::io::{BufRead, Seek};

use serde::Serialize;
use tracing::debug;

use crate::domain::TaxId;
use crate::error::KiraError;
use crate::taxonomy::index::{NodeFileIndex, NodeRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Per-session memo of node lookups. Misses are remembered as well, so a node
/// absent from the file costs one search per session.
#[derive(Debug, Default)]
pub struct LineageCache {
    entries: HashMap<TaxId, Option<NodeRecord>>,
    stats: CacheStats,
}

impl LineageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve<R: BufRead + Seek>(
        &mut self,
        id: TaxId,
        index: &mut NodeFileIndex<R>,
    ) -> Result<Option<NodeRecord>, KiraError> {
        if let Some(entry) = self.entries.get(&id) {
            self.stats.hits += 1;
            return Ok(entry.clone());
        }
        self.stats.misses += 1;
        let resolved = index.find_parent(id)?;
        if resolved.is_none() {
            debug!(%id, "caching missing node");
        }
        self.entries.insert(id, resolved.clone());
        Ok(resolved)
    }

    /// `None` when the node was never looked up, `Some(None)` when it was looked
    /// up and is absent from the file.
    pub fn get(&self, id: TaxId) -> Option<Option<&NodeRecord>> {
        self.entries.get(&id).map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
