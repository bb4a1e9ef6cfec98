use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::domain::TaxId;

/// Two node ids that share one display name. Only `kept` stays reachable by
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameConflict {
    pub name: String,
    pub kept: TaxId,
    pub dropped: TaxId,
}

/// Id↔name mapping for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    by_id: BTreeMap<TaxId, String>,
    by_name: BTreeMap<String, TaxId>,
    conflicts: Vec<NameConflict>,
}

impl Translation {
    /// Builds the mapping from `id -> name` and inverts it. Inverting loses
    /// information when several ids carry the same name; the smallest id keeps
    /// the name and the rest are reported through [`Translation::conflicts`].
    pub fn from_ids(names: &HashMap<TaxId, String>) -> Self {
        let by_id = names
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect::<BTreeMap<_, _>>();

        let mut by_name = BTreeMap::new();
        let mut conflicts = Vec::new();
        for (id, name) in &by_id {
            match by_name.get(name) {
                Some(&kept) => {
                    warn!(%name, %kept, dropped = %id, "display name shared by several nodes");
                    conflicts.push(NameConflict {
                        name: name.clone(),
                        kept,
                        dropped: *id,
                    });
                }
                None => {
                    by_name.insert(name.clone(), *id);
                }
            }
        }

        Self {
            by_id,
            by_name,
            conflicts,
        }
    }

    /// Builds the mapping from `name -> id`. Several names may point at one id;
    /// the reverse direction then uses the lexicographically smallest name.
    pub fn from_names(taxids: &HashMap<String, TaxId>) -> Self {
        let by_name = taxids
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect::<BTreeMap<_, _>>();

        let mut by_id = BTreeMap::new();
        for (name, id) in &by_name {
            by_id.entry(*id).or_insert_with(|| name.clone());
        }

        Self {
            by_id,
            by_name,
            conflicts: Vec::new(),
        }
    }

    pub fn name_of(&self, id: TaxId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn taxid_of(&self, name: &str) -> Option<TaxId> {
        self.by_name.get(name).copied()
    }

    pub fn conflicts(&self) -> &[NameConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
