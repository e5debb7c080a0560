//! Common fixtures for dx_reasoning integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dx_core::{
    Catalog, Condition, ConditionId, DxConfig, EmbeddingProvider, FetchError, MatchCriteria,
    SymptomWeight,
};
use dx_reasoning::DiagnosisEngine;

/// Builds a head condition from special symptoms.
pub fn condition(id: &str, symptoms: &[&str]) -> Condition {
    located(id, &["head"], symptoms)
}

pub fn located(id: &str, locations: &[&str], symptoms: &[&str]) -> Condition {
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

/// Attaches an explicit sensitivity/specificity/weight profile to `token`.
pub fn weighted(mut c: Condition, token: &str, sensitivity: f64, specificity: f64, weight: f64) -> Condition {
    c.match_criteria.symptom_weights.insert(
        token.to_string(),
        SymptomWeight {
            sensitivity: Some(sensitivity),
            specificity: Some(specificity),
            weight: Some(weight),
        },
    );
    c
}

/// A: head / throbbing + light_sensitivity, B: head / dull + pressure, C: chest.
pub fn headache_catalog() -> anyhow::Result<Catalog> {
    let mut a = located("a", &["head"], &["throbbing", "light_sensitivity"]);
    a.match_criteria.symptom_weights = BTreeMap::from([(
        "light_sensitivity".to_string(),
        SymptomWeight {
            sensitivity: Some(0.9),
            specificity: Some(0.8),
            weight: None,
        },
    )]);
    let b = located("b", &["head"], &["dull", "pressure"]);
    let c = located("c", &["chest"], &["tightness"]);
    Ok(Catalog::new(vec![a, b, c])?)
}

/// `n` head conditions `c00`, `c01`, ... sharing symptoms in a rotating pattern.
pub fn numbered_catalog(n: usize) -> anyhow::Result<Catalog> {
    let conditions = (0..n)
        .map(|i| {
            let symptom = format!("s{}", i % 3);
            let extra = format!("t{}", i % 5);
            condition(&format!("c{:02}", i), &[symptom.as_str(), extra.as_str()])
        })
        .collect();
    Ok(Catalog::new(conditions)?)
}

pub fn engine(catalog: Catalog) -> anyhow::Result<DiagnosisEngine> {
    Ok(DiagnosisEngine::from_catalog(catalog, DxConfig::default())?)
}

pub fn engine_with(catalog: Catalog, config: DxConfig) -> anyhow::Result<DiagnosisEngine> {
    Ok(DiagnosisEngine::from_catalog(catalog, config)?)
}

pub fn ids(conditions: &[Arc<Condition>]) -> Vec<String> {
    conditions.iter().map(|c| c.id.to_string()).collect()
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

pub fn id(s: &str) -> ConditionId {
    ConditionId::new(s)
}
