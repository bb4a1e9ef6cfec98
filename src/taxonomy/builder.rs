use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::TaxId;
use crate::error::KiraError;
use crate::names::NameResolver;
use crate::taxonomy::cache::{CacheStats, LineageCache};
use crate::taxonomy::index::{IndexStats, NodeFileIndex, SearchSettings};
use crate::taxonomy::lineage::{Lineage, LineagePath, LineageStatus, NodeRef, ROOT_RANK, UNKNOWN};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub index: IndexStats,
    pub cache: CacheStats,
    pub cached_nodes: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedBatch {
    pub lineages: BTreeMap<TaxId, Lineage>,
    pub names: HashMap<TaxId, String>,
}

/// One resolution session: a node file handle plus the cache filled while
/// walking it. Sessions are cheap to create and must not be shared; open one per
/// batch.
pub struct LineageBuilder<R> {
    index: NodeFileIndex<R>,
    cache: LineageCache,
    max_depth: usize,
}

impl LineageBuilder<BufReader<File>> {
    pub fn open(path: &Path, settings: SearchSettings) -> Result<Self, KiraError> {
        Ok(Self::new(NodeFileIndex::open(path, settings)?))
    }
}

impl<R: BufRead + Seek> LineageBuilder<R> {
    pub fn from_reader(reader: R, settings: SearchSettings) -> Result<Self, KiraError> {
        Ok(Self::new(NodeFileIndex::from_reader(reader, settings)?))
    }

    pub fn new(index: NodeFileIndex<R>) -> Self {
        let max_depth = index.settings().max_depth;
        Self {
            index,
            cache: LineageCache::new(),
            max_depth,
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            index: self.index.stats(),
            cache: self.cache.stats(),
            cached_nodes: self.cache.len(),
        }
    }

    /// Walks parent pointers from `id` up to the root and returns the path in
    /// root-to-leaf order.
    pub fn build(&mut self, id: TaxId) -> Result<LineagePath, KiraError> {
        let mut nodes = vec![id];
        let mut ranks: Vec<String> = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = id;
        let mut status = LineageStatus::Complete;

        while !current.is_root() {
            if ranks.len() >= self.max_depth {
                warn!(%id, max_depth = self.max_depth, "lineage exceeds maximum depth");
                status = LineageStatus::Partial;
                break;
            }
            let Some(record) = self.cache.get_or_resolve(current, &mut self.index)? else {
                if current == id {
                    warn!(%id, "no lineage found");
                    return Ok(LineagePath::unknown());
                }
                warn!(%id, missing = %current, "ancestor missing from taxonomy file");
                status = LineageStatus::Partial;
                break;
            };
            ranks.push(record.rank);
            current = record.parent;
            if !visited.insert(current) {
                warn!(%id, repeated = %current, "cycle in parent pointers");
                status = LineageStatus::Partial;
                break;
            }
            nodes.push(current);
        }

        let mut path_nodes: Vec<NodeRef>;
        let mut path_ranks: Vec<String>;
        match status {
            LineageStatus::Complete => {
                ranks.push(ROOT_RANK.to_string());
                path_nodes = nodes.into_iter().rev().map(NodeRef::Known).collect();
                path_ranks = ranks.into_iter().rev().collect();
            }
            _ => {
                // Only the nodes whose rank was read are trustworthy.
                nodes.truncate(ranks.len());
                path_nodes = vec![NodeRef::Known(TaxId::ROOT), NodeRef::Unknown];
                path_ranks = vec![ROOT_RANK.to_string(), UNKNOWN.to_string()];
                path_nodes.extend(nodes.into_iter().rev().map(NodeRef::Known));
                path_ranks.extend(ranks.into_iter().rev());
            }
        }

        Ok(LineagePath {
            nodes: path_nodes,
            ranks: path_ranks,
            status,
        })
    }

    /// Builds every lineage of the batch, then names all nodes that occur in any
    /// of them with a single pass over `names`.
    pub fn resolve_batch(
        &mut self,
        ids: &BTreeSet<TaxId>,
        names: &dyn NameResolver,
    ) -> Result<ResolvedBatch, KiraError> {
        let mut paths = BTreeMap::new();
        for &id in ids {
            paths.insert(id, self.build(id)?);
        }

        let all_nodes = paths
            .values()
            .flat_map(|path| path.nodes.iter().filter_map(NodeRef::known))
            .collect::<BTreeSet<_>>();
        info!(
            lineages = paths.len(),
            nodes = all_nodes.len(),
            "resolving lineage names"
        );
        let names = names.resolve_names(&all_nodes)?;

        let lineages = paths
            .into_iter()
            .map(|(id, path)| (id, Lineage::from_path(path, &names)))
            .collect();
        Ok(ResolvedBatch { lineages, names })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn builder(content: &str) -> LineageBuilder<Cursor<Vec<u8>>> {
        LineageBuilder::from_reader(
            Cursor::new(content.as_bytes().to_vec()),
            SearchSettings::default(),
        )
        .unwrap()
    }

    fn taxid(value: u64) -> TaxId {
        TaxId::new(value).unwrap()
    }

    fn known(values: &[u64]) -> Vec<NodeRef> {
        values.iter().map(|&v| NodeRef::Known(taxid(v))).collect()
    }

    #[test]
    fn root_lineage_is_a_single_node() {
        let mut builder = builder("1|1|no rank\n");
        let path = builder.build(TaxId::ROOT).unwrap();
        assert_eq!(path.nodes, known(&[1]));
        assert_eq!(path.ranks, vec!["root"]);
        assert_eq!(builder.stats().index.lookups, 0);
    }

    #[test]
    fn missing_ancestor_yields_partial_lineage() {
        // 20 points at 15, which is absent.
        let mut builder = builder("1|1|no rank\n2|1|superkingdom\n20|15|genus\n30|20|species\n");
        let path = builder.build(taxid(30)).unwrap();
        assert_eq!(path.status, LineageStatus::Partial);
        assert_eq!(
            path.nodes,
            vec![
                NodeRef::Known(TaxId::ROOT),
                NodeRef::Unknown,
                NodeRef::Known(taxid(20)),
                NodeRef::Known(taxid(30)),
            ]
        );
        assert_eq!(path.ranks, vec!["root", UNKNOWN, "genus", "species"]);
    }

    #[test]
    fn parent_cycle_is_cut() {
        let mut builder = builder("1|1|no rank\n5|6|genus\n6|5|family\n");
        let path = builder.build(taxid(5)).unwrap();
        assert_eq!(path.status, LineageStatus::Partial);
        assert_eq!(path.nodes.last(), Some(&NodeRef::Known(taxid(5))));
        assert_eq!(path.ranks.first().map(String::as_str), Some("root"));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let settings = SearchSettings {
            max_depth: 2,
            ..SearchSettings::default()
        };
        let content = "1|1|no rank\n2|1|a\n3|2|b\n4|3|c\n5|4|d\n";
        let mut builder =
            LineageBuilder::from_reader(Cursor::new(content.as_bytes().to_vec()), settings)
                .unwrap();
        let path = builder.build(taxid(5)).unwrap();
        assert_eq!(path.status, LineageStatus::Partial);
        assert_eq!(path.nodes.len(), path.ranks.len());
        assert_eq!(path.nodes.last(), Some(&NodeRef::Known(taxid(5))));
    }
}
