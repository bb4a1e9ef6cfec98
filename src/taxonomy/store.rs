use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, Seek};

use tracing::warn;

use crate::domain::{InputKind, TaxId, normalize_organism_name};
use crate::error::KiraError;
use crate::names::NameResolver;
use crate::taxonomy::builder::LineageBuilder;
use crate::taxonomy::lineage::{Lineage, UNKNOWN};
use crate::taxonomy::translation::Translation;

/// Resolved lineages of one batch, reachable by taxonomic id and by organism
/// name. Every identifier the batch was built from has exactly one lineage,
/// which is the unknown placeholder when it could not be resolved.
#[derive(Debug, Clone)]
pub struct LineageStore {
    kind: InputKind,
    identifiers: BTreeSet<String>,
    lineages: BTreeMap<String, Lineage>,
    translation: Translation,
}

impl LineageStore {
    pub fn resolve<R, S>(
        builder: &mut LineageBuilder<R>,
        names: &dyn NameResolver,
        kind: InputKind,
        identifiers: impl IntoIterator<Item = S>,
    ) -> Result<Self, KiraError>
    where
        R: BufRead + Seek,
        S: AsRef<str>,
    {
        match kind {
            InputKind::TaxId => Self::from_taxids(builder, names, identifiers),
            InputKind::Organism => Self::from_organisms(builder, names, identifiers),
        }
    }

    /// Identifiers that do not parse as a taxonomic id are kept and get the
    /// unknown lineage.
    pub fn from_taxids<R, S>(
        builder: &mut LineageBuilder<R>,
        names: &dyn NameResolver,
        identifiers: impl IntoIterator<Item = S>,
    ) -> Result<Self, KiraError>
    where
        R: BufRead + Seek,
        S: AsRef<str>,
    {
        let mut keyed = BTreeMap::new();
        for raw in identifiers {
            let raw = raw.as_ref().trim();
            match raw.parse::<TaxId>() {
                Ok(id) => {
                    keyed.insert(id.to_string(), Some(id));
                }
                Err(err) => {
                    warn!(identifier = raw, %err, "unusable taxonomic identifier");
                    keyed.insert(raw.to_string(), None);
                }
            }
        }

        let ids = keyed.values().flatten().copied().collect::<BTreeSet<_>>();
        let batch = builder.resolve_batch(&ids, names)?;

        let lineages = keyed
            .iter()
            .map(|(key, id)| {
                let lineage = id
                    .and_then(|id| batch.lineages.get(&id).cloned())
                    .unwrap_or_else(Lineage::unknown);
                (key.clone(), lineage)
            })
            .collect();
        let input_names = ids
            .iter()
            .filter_map(|id| batch.names.get(id).map(|name| (*id, name.clone())))
            .collect::<HashMap<_, _>>();

        Ok(Self {
            kind: InputKind::TaxId,
            identifiers: keyed.into_keys().collect(),
            lineages,
            translation: Translation::from_ids(&input_names),
        })
    }

    /// Organism names are normalized before lookup; names without a taxid get
    /// the unknown lineage.
    pub fn from_organisms<R, S>(
        builder: &mut LineageBuilder<R>,
        names: &dyn NameResolver,
        organisms: impl IntoIterator<Item = S>,
    ) -> Result<Self, KiraError>
    where
        R: BufRead + Seek,
        S: AsRef<str>,
    {
        let mut identifiers = BTreeSet::new();
        for raw in organisms {
            let normalized = normalize_organism_name(raw.as_ref());
            if normalized.is_empty() {
                warn!(organism = raw.as_ref(), "empty organism name skipped");
                continue;
            }
            identifiers.insert(normalized);
        }

        let taxids = names.resolve_taxids(&identifiers)?;
        let ids = taxids.values().copied().collect::<BTreeSet<_>>();
        let batch = builder.resolve_batch(&ids, names)?;

        let lineages = identifiers
            .iter()
            .map(|name| {
                let lineage = taxids
                    .get(name)
                    .and_then(|id| batch.lineages.get(id).cloned())
                    .unwrap_or_else(Lineage::unknown);
                (name.clone(), lineage)
            })
            .collect();

        Ok(Self {
            kind: InputKind::Organism,
            identifiers,
            lineages,
            translation: Translation::from_names(&taxids),
        })
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// The input key set the store was built from, in canonical form.
    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Canonical key for an identifier of the store's own kind, if the batch
    /// contains it.
    pub fn canonical(&self, identifier: &str) -> Option<String> {
        let key = match self.kind {
            InputKind::TaxId => identifier
                .parse::<TaxId>()
                .map(|id| id.to_string())
                .unwrap_or_else(|_| identifier.trim().to_string()),
            InputKind::Organism => normalize_organism_name(identifier),
        };
        self.identifiers.contains(&key).then_some(key)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.canonical(identifier).is_some()
    }

    pub fn lineage(&self, identifier: &str) -> Option<&Lineage> {
        self.canonical(identifier)
            .and_then(|key| self.lineages.get(&key))
    }

    pub fn lineage_by_id(&self, id: TaxId) -> Option<&Lineage> {
        match self.kind {
            InputKind::TaxId => self.lineages.get(&id.to_string()),
            InputKind::Organism => self
                .translation
                .name_of(id)
                .and_then(|name| self.lineages.get(name)),
        }
    }

    pub fn lineage_by_name(&self, name: &str) -> Option<&Lineage> {
        match self.kind {
            InputKind::Organism => self.lineages.get(&normalize_organism_name(name)),
            InputKind::TaxId => self
                .taxid_of(name)
                .and_then(|id| self.lineages.get(&id.to_string())),
        }
    }

    /// Looks the name up verbatim first, then in normalized form.
    pub fn taxid_of(&self, name: &str) -> Option<TaxId> {
        self.translation
            .taxid_of(name)
            .or_else(|| self.translation.taxid_of(&normalize_organism_name(name)))
    }

    pub fn name_of(&self, id: TaxId) -> Option<&str> {
        self.translation.name_of(id)
    }

    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    /// Name of the superkingdom node of the identifier's lineage, or
    /// `"Unknown"`.
    pub fn domain_of(&self, identifier: &str) -> String {
        self.lineage(identifier)
            .map(|lineage| lineage.domain().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn lineages(&self) -> impl Iterator<Item = (&str, &Lineage)> + '_ {
        self.lineages
            .iter()
            .map(|(identifier, lineage)| (identifier.as_str(), lineage))
    }
}
