use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::domain::TaxId;

/// Marker used for node ids and names that could not be resolved.
pub const UNKNOWN: &str = "Unknown";
pub const ROOT_RANK: &str = "root";
pub const SUPERKINGDOM_RANK: &str = "superkingdom";

/// Rank layout of the placeholder lineage handed out for unresolvable input.
pub const PLACEHOLDER_RANKS: [&str; 9] = [
    ROOT_RANK,
    "no rank",
    SUPERKINGDOM_RANK,
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "species",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Known(TaxId),
    Unknown,
}

impl NodeRef {
    pub fn known(&self) -> Option<TaxId> {
        match self {
            NodeRef::Known(id) => Some(*id),
            NodeRef::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, NodeRef::Unknown)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Known(id) => write!(f, "{id}"),
            NodeRef::Unknown => write!(f, "{UNKNOWN}"),
        }
    }
}

impl Serialize for NodeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeRef::Known(id) => serializer.serialize_u64(id.get()),
            NodeRef::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageStatus {
    /// Every node from the root down to the query was found.
    Complete,
    /// The query was found but the walk broke off before reaching the root.
    Partial,
    /// The query itself could not be resolved.
    Unknown,
}

/// Root-to-leaf node ids and ranks, before names are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineagePath {
    pub nodes: Vec<NodeRef>,
    pub ranks: Vec<String>,
    pub status: LineageStatus,
}

impl LineagePath {
    pub fn unknown() -> Self {
        Self {
            nodes: vec![NodeRef::Unknown; PLACEHOLDER_RANKS.len()],
            ranks: PLACEHOLDER_RANKS.iter().map(|rank| rank.to_string()).collect(),
            status: LineageStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageEntry {
    pub node: NodeRef,
    pub rank: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lineage {
    entries: Vec<LineageEntry>,
    status: LineageStatus,
}

impl Lineage {
    pub fn unknown() -> Self {
        Self::from_path(LineagePath::unknown(), &HashMap::new())
    }

    /// Attaches display names to a resolved path; nodes without a name get
    /// [`UNKNOWN`].
    pub fn from_path(path: LineagePath, names: &HashMap<TaxId, String>) -> Self {
        let entries = path
            .nodes
            .into_iter()
            .zip(path.ranks)
            .map(|(node, rank)| {
                let name = node
                    .known()
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_else(|| UNKNOWN.to_string());
                LineageEntry { node, rank, name }
            })
            .collect();
        Self {
            entries,
            status: path.status,
        }
    }

    pub fn entries(&self) -> &[LineageEntry] {
        &self.entries
    }

    pub fn status(&self) -> LineageStatus {
        self.status
    }

    pub fn is_unknown(&self) -> bool {
        self.status == LineageStatus::Unknown
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn leaf(&self) -> Option<&LineageEntry> {
        self.entries.last()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.entries.iter().map(|entry| entry.node)
    }

    pub fn ranks(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.rank.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn first_with_rank(&self, rank: &str) -> Option<&LineageEntry> {
        self.entries.iter().find(|entry| entry.rank == rank)
    }

    /// Domain of life, i.e. the name of the superkingdom node.
    pub fn domain(&self) -> &str {
        self.first_with_rank(SUPERKINGDOM_RANK)
            .map(|entry| entry.name.as_str())
            .unwrap_or(UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_fixed_shape() {
        let lineage = Lineage::unknown();
        assert_eq!(lineage.len(), PLACEHOLDER_RANKS.len());
        assert!(lineage.nodes().all(|node| node.is_unknown()));
        assert!(lineage.names().all(|name| name == UNKNOWN));
        assert_eq!(lineage.ranks().next(), Some(ROOT_RANK));
        assert_eq!(lineage.domain(), UNKNOWN);
    }

    #[test]
    fn node_ref_serializes_as_number_or_marker() {
        let known = serde_json::to_string(&NodeRef::Known(TaxId::ROOT)).unwrap();
        let unknown = serde_json::to_string(&NodeRef::Unknown).unwrap();
        assert_eq!(known, "1");
        assert_eq!(unknown, "\"Unknown\"");
    }
}
