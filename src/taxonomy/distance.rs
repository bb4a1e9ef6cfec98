//! Phylogenetic distance between lineages of one batch.
//!
//! Two lineages always share a prefix starting at the root; the deepest node of
//! that prefix is the common ancestor. The score is derived from it under one
//! of two policies:
//!
//! - [`ScorePolicy::Rank`]: a fixed value per rank of the common ancestor, from
//!   `root = 7` down to `species = 0`. Any other rank is rejected.
//! - [`ScorePolicy::Length`]: the mean number of nodes between the common
//!   ancestor and each of the two leaves.
//!
//! Lower scores mean closer relatives under both policies.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::domain::ScorePolicy;
use crate::error::KiraError;
use crate::taxonomy::lineage::{Lineage, NodeRef, UNKNOWN};
use crate::taxonomy::store::LineageStore;

pub const RANK_SCORES: [(&str, u8); 8] = [
    ("root", 7),
    ("superkingdom", 6),
    ("phylum", 5),
    ("class", 4),
    ("order", 3),
    ("family", 2),
    ("genus", 1),
    ("species", 0),
];

pub fn rank_score(rank: &str) -> Option<u8> {
    RANK_SCORES
        .iter()
        .find(|(name, _)| *name == rank)
        .map(|(_, score)| *score)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonAncestor {
    /// Position of the ancestor in both lineages; `None` when either side is
    /// unknown.
    pub index: Option<usize>,
    pub node: NodeRef,
    pub rank: String,
    pub name: String,
}

impl CommonAncestor {
    fn unknown() -> Self {
        Self {
            index: None,
            node: NodeRef::Unknown,
            rank: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
        }
    }
}

/// Walks both lineages from the root in lockstep and returns the last node on
/// which they agree.
pub fn common_ancestor(a: &Lineage, b: &Lineage) -> CommonAncestor {
    if a.is_unknown() || b.is_unknown() {
        return CommonAncestor::unknown();
    }

    let mut deepest = None;
    for (index, (left, right)) in a.entries().iter().zip(b.entries()).enumerate() {
        if left.node.is_unknown() || left.node != right.node {
            break;
        }
        deepest = Some(index);
    }

    match deepest {
        Some(index) => {
            let entry = &a.entries()[index];
            CommonAncestor {
                index: Some(index),
                node: entry.node,
                rank: entry.rank.clone(),
                name: entry.name.clone(),
            }
        }
        None => CommonAncestor::unknown(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceResult {
    pub common_node: NodeRef,
    pub common_rank: String,
    pub common_name: String,
    /// `None` when either lineage is unknown.
    pub score: Option<f64>,
}

/// Best score of a nearest/farthest query and every pair that reaches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BestPairs {
    pub score: Option<f64>,
    pub pairs: BTreeSet<(String, String)>,
}

#[derive(Debug, Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

impl Extreme {
    fn beats(self, candidate: f64, best: f64) -> bool {
        match self {
            Extreme::Min => candidate < best,
            Extreme::Max => candidate > best,
        }
    }
}

impl BestPairs {
    fn offer(&mut self, extreme: Extreme, score: f64, pair: (String, String)) {
        match self.score {
            Some(best) if score == best => {
                self.pairs.insert(pair);
            }
            Some(best) if !extreme.beats(score, best) => {}
            _ => {
                self.score = Some(score);
                self.pairs = BTreeSet::from([pair]);
            }
        }
    }
}

pub struct DistanceEngine<'a> {
    store: &'a LineageStore,
    policy: ScorePolicy,
}

impl<'a> DistanceEngine<'a> {
    pub fn new(store: &'a LineageStore, policy: ScorePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ScorePolicy {
        self.policy
    }

    pub fn score(
        &self,
        ancestor: &CommonAncestor,
        a: &Lineage,
        b: &Lineage,
    ) -> Result<Option<f64>, KiraError> {
        let Some(index) = ancestor.index else {
            return Ok(None);
        };
        match self.policy {
            ScorePolicy::Rank => rank_score(&ancestor.rank)
                .map(|score| Some(f64::from(score)))
                .ok_or_else(|| KiraError::UnscoredRank(ancestor.rank.clone())),
            ScorePolicy::Length => {
                let below_a = a.len() - index - 1;
                let below_b = b.len() - index - 1;
                Ok(Some((below_a + below_b) as f64 / 2.0))
            }
        }
    }

    pub fn distance_between(&self, a: &Lineage, b: &Lineage) -> Result<DistanceResult, KiraError> {
        let ancestor = common_ancestor(a, b);
        let score = self.score(&ancestor, a, b)?;
        Ok(DistanceResult {
            common_node: ancestor.node,
            common_rank: ancestor.rank,
            common_name: ancestor.name,
            score,
        })
    }

    pub fn pairwise(&self, first: &str, second: &str) -> Result<DistanceResult, KiraError> {
        let (_, a) = self.lineage_of(first)?;
        let (_, b) = self.lineage_of(second)?;
        self.distance_between(a, b)
    }

    /// Distances between every pair of the batch, stored under both orderings.
    pub fn all_pairs(&self) -> Result<BTreeMap<String, BTreeMap<String, DistanceResult>>, KiraError> {
        let mut out: BTreeMap<String, BTreeMap<String, DistanceResult>> = self
            .store
            .identifiers()
            .iter()
            .map(|id| (id.clone(), BTreeMap::new()))
            .collect();

        for (first, second) in self.unordered_pairs() {
            let (_, a) = self.lineage_of(first)?;
            let (_, b) = self.lineage_of(second)?;
            let result = self.distance_between(a, b)?;
            if let Some(row) = out.get_mut(second) {
                row.insert(first.clone(), result.clone());
            }
            if let Some(row) = out.get_mut(first) {
                row.insert(second.clone(), result);
            }
        }
        Ok(out)
    }

    pub fn closest(&self, target: &str) -> Result<BestPairs, KiraError> {
        self.best_for_target(target, Extreme::Min)
    }

    pub fn farthest(&self, target: &str) -> Result<BestPairs, KiraError> {
        self.best_for_target(target, Extreme::Max)
    }

    pub fn min_overall(&self) -> Result<BestPairs, KiraError> {
        self.best_overall(Extreme::Min)
    }

    pub fn max_overall(&self) -> Result<BestPairs, KiraError> {
        self.best_overall(Extreme::Max)
    }

    fn best_for_target(&self, target: &str, extreme: Extreme) -> Result<BestPairs, KiraError> {
        let (target, target_lineage) = self.lineage_of(target)?;
        let mut best = BestPairs::default();
        for other in self.store.identifiers() {
            if *other == target {
                continue;
            }
            let (_, lineage) = self.lineage_of(other)?;
            let result = self.distance_between(target_lineage, lineage)?;
            match result.score {
                Some(score) => best.offer(extreme, score, (target.clone(), other.clone())),
                None => debug!(%target, %other, "skipping pair with unknown lineage"),
            }
        }
        Ok(best)
    }

    fn best_overall(&self, extreme: Extreme) -> Result<BestPairs, KiraError> {
        let mut best = BestPairs::default();
        for (first, second) in self.unordered_pairs() {
            let (_, a) = self.lineage_of(first)?;
            let (_, b) = self.lineage_of(second)?;
            let result = self.distance_between(a, b)?;
            match result.score {
                Some(score) => best.offer(extreme, score, (first.clone(), second.clone())),
                None => debug!(%first, %second, "skipping pair with unknown lineage"),
            }
        }
        Ok(best)
    }

    fn unordered_pairs(&self) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
        let ids = self.store.identifiers();
        ids.iter()
            .enumerate()
            .flat_map(move |(i, first)| ids.iter().skip(i + 1).map(move |second| (first, second)))
    }

    fn lineage_of(&self, identifier: &str) -> Result<(String, &'a Lineage), KiraError> {
        let key = self
            .store
            .canonical(identifier)
            .ok_or_else(|| KiraError::UnknownIdentifier(identifier.to_string()))?;
        let lineage = self
            .store
            .lineage(&key)
            .ok_or_else(|| KiraError::UnknownIdentifier(identifier.to_string()))?;
        Ok((key, lineage))
    }
}
