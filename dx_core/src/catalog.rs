//! Validated, immutable condition catalog.
//!
//! The knowledge base is assembled from named category sources (common,
//! neurological, mental, ...). Sources are merged in order under an explicit
//! [`DuplicatePolicy`]; a later source can never silently replace a record
//! from an earlier one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, ConditionId};
use crate::error::{DxError, Result};

/// A named batch of condition records, e.g. one category file.
#[derive(Clone, Debug)]
pub struct CatalogSource {
    pub name: String,
    pub conditions: Vec<Condition>,
}

impl CatalogSource {
    pub fn new(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }

    /// Parses a JSON array of condition records.
    pub fn from_json_str(name: impl Into<String>, json: &str) -> Result<Self> {
        let conditions: Vec<Condition> = serde_json::from_str(json)?;
        Ok(Self::new(name, conditions))
    }

    /// Reads a JSON array of condition records; the source is named after the file stem.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_json_str(name, &json)
    }
}

/// What to do when two sources declare the same condition ID.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Any collision is an error.
    #[default]
    Reject,
    /// A later source may replace an earlier record only for the listed IDs.
    AllowOverrides(BTreeSet<ConditionId>),
}

impl DuplicatePolicy {
    fn permits(&self, id: &ConditionId) -> bool {
        match self {
            DuplicatePolicy::Reject => false,
            DuplicatePolicy::AllowOverrides(ids) => ids.contains(id),
        }
    }
}

/// Catalog entry that was left out of the index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub source: String,
    pub id: String,
    pub reason: String,
}

/// Content fingerprint of a catalog (BLAKE3, hex).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogVersion(pub String);

impl std::fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough for logs
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}

/// The immutable knowledge base.
#[derive(Clone, Debug)]
pub struct Catalog {
    conditions: BTreeMap<ConditionId, Arc<Condition>>,
    skipped: Vec<SkippedEntry>,
    version: CatalogVersion,
}

impl Catalog {
    /// Builds a catalog from a single source, rejecting duplicate IDs.
    pub fn new(conditions: Vec<Condition>) -> Result<Self> {
        Self::from_sources(vec![CatalogSource::new("catalog", conditions)], DuplicatePolicy::Reject)
    }

    pub fn empty() -> Self {
        Self::assemble(BTreeMap::new(), Vec::new())
    }

    /// Merges sources in order under `policy`.
    ///
    /// Records are normalized first. Records with an empty ID or without
    /// locations cannot be bucketed; they are skipped and reported through
    /// [`Catalog::skipped`] instead of failing the whole build.
    pub fn from_sources(sources: Vec<CatalogSource>, policy: DuplicatePolicy) -> Result<Self> {
        let mut conditions: BTreeMap<ConditionId, Arc<Condition>> = BTreeMap::new();
        let mut origin: BTreeMap<ConditionId, String> = BTreeMap::new();
        let mut skipped = Vec::new();

        for source in sources {
            for raw in source.conditions {
                let condition = raw.normalized();

                if let Err(reason) = validate(&condition) {
                    tracing::warn!(
                        source = %source.name,
                        id = %condition.id,
                        "Skipping malformed condition: {}",
                        reason
                    );
                    skipped.push(SkippedEntry {
                        source: source.name.clone(),
                        id: condition.id.0.clone(),
                        reason,
                    });
                    continue;
                }

                let id = condition.id.clone();
                if let Some(first) = origin.get(&id) {
                    if !policy.permits(&id) {
                        return Err(DxError::DuplicateCondition {
                            id: id.0,
                            first: first.clone(),
                            second: source.name.clone(),
                        });
                    }
                    tracing::info!(
                        id = %id,
                        replaced = %first,
                        by = %source.name,
                        "Condition overridden by later source"
                    );
                }

                origin.insert(id.clone(), source.name.clone());
                conditions.insert(id, Arc::new(condition));
            }
        }

        for condition in conditions.values() {
            for mimic in &condition.mimics {
                if !conditions.contains_key(mimic) {
                    tracing::debug!(id = %condition.id, mimic = %mimic, "Mimic not in catalog");
                }
            }
        }

        Ok(Self::assemble(conditions, skipped))
    }

    /// Reads a single JSON catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_sources(vec![CatalogSource::from_path(path)?], DuplicatePolicy::Reject)
    }

    fn assemble(conditions: BTreeMap<ConditionId, Arc<Condition>>, skipped: Vec<SkippedEntry>) -> Self {
        let version = fingerprint(&conditions);
        Self {
            conditions,
            skipped,
            version,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Condition>> {
        self.conditions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conditions.contains_key(id)
    }

    /// Conditions in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Condition>> {
        self.conditions.values()
    }

    pub fn all(&self) -> Vec<Arc<Condition>> {
        self.conditions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    pub fn version(&self) -> &CatalogVersion {
        &self.version
    }
}

fn validate(condition: &Condition) -> std::result::Result<(), String> {
    if condition.id.as_str().is_empty() {
        return Err("missing id".to_string());
    }
    if condition.match_criteria.locations.is_empty() {
        return Err("matchCriteria.locations is empty".to_string());
    }
    Ok(())
}

fn fingerprint(conditions: &BTreeMap<ConditionId, Arc<Condition>>) -> CatalogVersion {
    let mut hasher = blake3::Hasher::new();
    for condition in conditions.values() {
        // Serializing a plain data record cannot fail; fall back to the ID if it ever does.
        match serde_json::to_vec(condition.as_ref()) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(condition.id.as_str().as_bytes()),
        };
        hasher.update(b"\n");
    }
    CatalogVersion(hasher.finalize().to_hex().to_string())
}
