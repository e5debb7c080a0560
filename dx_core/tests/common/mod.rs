//! Common fixtures for dx_core integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dx_core::{
    Catalog, Condition, ConditionId, ConditionStore, EmbeddingProvider, FetchError, IndexConfig,
    IndexStore, MatchCriteria, SimilarityMatch, SymptomWeight,
};

/// Builds a condition from locations and special symptoms.
pub fn condition(id: &str, locations: &[&str], symptoms: &[&str]) -> Condition {
    Condition::new(
        id,
        id,
        MatchCriteria {
            locations: locations.iter().map(|s| s.to_string()).collect(),
            special_symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        },
    )
}

/// A: head / throbbing + light_sensitivity, B: head / dull + pressure, C: chest.
pub fn headache_catalog() -> anyhow::Result<Catalog> {
    let mut a = condition("a", &["head"], &["throbbing", "light_sensitivity"]);
    a.match_criteria.symptom_weights = BTreeMap::from([(
        "light_sensitivity".to_string(),
        SymptomWeight {
            sensitivity: Some(0.9),
            specificity: Some(0.8),
            weight: None,
        },
    )]);
    let b = condition("b", &["head"], &["dull", "pressure"]);
    let c = condition("c", &["chest"], &["tightness"]);
    Ok(Catalog::new(vec![a, b, c])?)
}

/// A larger catalog spread over every bucket.
pub fn mixed_catalog() -> anyhow::Result<Catalog> {
    Ok(Catalog::new(vec![
        condition("migraine", &["head", "temples"], &["nausea", "light sensitivity", "aura"]),
        condition("tension_headache", &["forehead"], &["pressure", "stress"]),
        condition("sinusitis", &["sinus", "face"], &["congestion", "pressure", "fever"]),
        condition("angina", &["chest"], &["tightness", "sweating", "nausea"]),
        condition("gerd", &["chest", "throat"], &["heartburn", "nausea"]),
        condition("gastritis", &["stomach"], &["nausea", "bloating"]),
        condition("lumbar_strain", &["lower back"], &["stiffness"]),
        condition("ankle_sprain", &["ankle"], &["swelling", "bruising"]),
        condition("eczema", &["skin"], &["itching", "rash"]),
        condition("conjunctivitis", &["eye"], &["redness", "itching"]),
        condition("influenza", &["whole body"], &["fever", "fatigue", "chills"]),
        condition("mystery", &["elsewhere"], &["fatigue"]),
    ])?)
}

pub fn index(catalog: Catalog) -> Arc<IndexStore> {
    IndexStore::shared(catalog, &IndexConfig::default())
}

/// Writes `content` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, content: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Embedding provider that always fails.
pub struct FailingEmbeddings;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, FetchError> {
        Err(FetchError::Transport("connection refused".to_string()))
    }
}

/// Embedding provider that never answers within any sane budget.
pub struct StalledEmbeddings;

#[async_trait]
impl EmbeddingProvider for StalledEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![1.0])
    }
}

/// Embedding provider returning a fixed vector.
pub struct FixedEmbeddings(pub Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, FetchError> {
        Ok(self.0.clone())
    }
}

/// Store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl ConditionStore for FailingStore {
    async fn match_conditions(
        &self,
        _embedding: &[f32],
        _threshold: f64,
        _count: usize,
    ) -> Result<Vec<SimilarityMatch>, FetchError> {
        Err(FetchError::Status {
            code: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn fetch_by_ids(&self, _ids: &[ConditionId]) -> Result<Vec<Condition>, FetchError> {
        Err(FetchError::Transport("reset".to_string()))
    }

    async fn fetch_all(&self) -> Result<Vec<Condition>, FetchError> {
        Err(FetchError::Transport("reset".to_string()))
    }
}
