//! Lineage resolution over a sorted NCBI `nodes.dmp` and distance scoring
//! between the resolved lineages.

pub mod builder;
pub mod cache;
pub mod distance;
pub mod index;
pub mod lineage;
pub mod store;
pub mod translation;

pub use builder::{LineageBuilder, ResolvedBatch, SessionStats};
pub use cache::{CacheStats, LineageCache};
pub use distance::{BestPairs, CommonAncestor, DistanceEngine, DistanceResult, common_ancestor};
pub use index::{IndexStats, NodeFileIndex, NodeRecord, SearchSettings};
pub use lineage::{Lineage, LineageEntry, LineagePath, LineageStatus, NodeRef, UNKNOWN};
pub use store::LineageStore;
pub use translation::{NameConflict, Translation};
