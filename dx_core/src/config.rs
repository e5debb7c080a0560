//! Tunable engine, index and retrieval parameters.
//!
//! Every section deserializes with `#[serde(default)]`, so a YAML file only
//! needs the keys it overrides:
//!
//! ```yaml
//! engine:
//!   max_candidates: 10
//!   selection_strategy: information_gain
//! retrieval:
//!   embedding_timeout_ms: 1500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DxError, Result};

/// How the Question Selector ranks tokens outside a mimic pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Walk the precomputed full-catalog ranking.
    #[default]
    GlobalRanking,
    /// Expected information gain over the live candidate set, per question.
    InformationGain,
}

/// Inference loop parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Normalized posterior below which a candidate is dropped (default: 0.01)
    pub pruning_threshold: f64,
    /// Upper bound on retained candidates (default: 20)
    pub max_candidates: usize,
    /// Leading confidence, in percent, that ends the session (default: 90)
    pub early_exit_confidence: f64,
    /// Minimum answer coverage a question needs to be worth asking (default: 0.4)
    pub min_coverage_ratio: f64,
    /// Starting candidate count that triggers pruning before the first question (default: 50)
    pub aggressive_prune_threshold: usize,
    /// How many top candidates are checked for mimic pairs (default: 3)
    pub mimic_window: usize,
    pub selection_strategy: SelectionStrategy,
    /// Interval overlap, as a fraction of the narrower interval, that counts as substantial (default: 0.5)
    pub uncertainty_overlap_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pruning_threshold: 0.01,
            max_candidates: 20,
            early_exit_confidence: 90.0,
            min_coverage_ratio: 0.4,
            aggressive_prune_threshold: 50,
            mimic_window: 3,
            selection_strategy: SelectionStrategy::GlobalRanking,
            uncertainty_overlap_ratio: 0.5,
        }
    }
}

impl EngineConfig {
    /// Early-exit threshold as a probability.
    pub fn early_exit_probability(&self) -> f64 {
        self.early_exit_confidence / 100.0
    }
}

/// Symptom Discriminability Index parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub min_token_ratio: f64,
    pub max_token_ratio: f64,
    /// Size of the precomputed question ranking
    pub top_questions: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_token_ratio: 0.05,
            max_token_ratio: 0.6,
            top_questions: 50,
        }
    }
}

/// Hybrid Retrieval parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_threshold: f64,
    pub match_count: usize,
    /// Fewer semantic hits than this triggers the structural fallback
    pub min_semantic_candidates: usize,
    pub embedding_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            match_count: 50,
            min_semantic_candidates: 5,
            embedding_timeout_ms: 3_000,
            store_timeout_ms: 5_000,
            cache_capacity: 64,
            cache_ttl_secs: 600,
        }
    }
}

impl RetrievalConfig {
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DxConfig {
    pub engine: EngineConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
}

impl DxConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: DxConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        unit_interval("engine.pruning_threshold", e.pruning_threshold)?;
        unit_interval("engine.min_coverage_ratio", e.min_coverage_ratio)?;
        unit_interval("engine.uncertainty_overlap_ratio", e.uncertainty_overlap_ratio)?;
        if !(e.early_exit_confidence > 0.0 && e.early_exit_confidence <= 100.0) {
            return Err(invalid(format!(
                "engine.early_exit_confidence must be in (0, 100], got {}",
                e.early_exit_confidence
            )));
        }
        nonzero("engine.max_candidates", e.max_candidates)?;
        nonzero("engine.aggressive_prune_threshold", e.aggressive_prune_threshold)?;

        let i = &self.index;
        unit_interval("index.min_token_ratio", i.min_token_ratio)?;
        unit_interval("index.max_token_ratio", i.max_token_ratio)?;
        if i.min_token_ratio > i.max_token_ratio {
            return Err(invalid(format!(
                "index.min_token_ratio ({}) exceeds index.max_token_ratio ({})",
                i.min_token_ratio, i.max_token_ratio
            )));
        }
        nonzero("index.top_questions", i.top_questions)?;

        let r = &self.retrieval;
        unit_interval("retrieval.similarity_threshold", r.similarity_threshold)?;
        nonzero("retrieval.match_count", r.match_count)?;
        nonzero("retrieval.cache_capacity", r.cache_capacity)?;
        nonzero("retrieval.embedding_timeout_ms", r.embedding_timeout_ms as usize)?;
        nonzero("retrieval.store_timeout_ms", r.store_timeout_ms as usize)?;
        Ok(())
    }
}

fn invalid(msg: String) -> DxError {
    DxError::InvalidConfig(msg)
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be in [0, 1], got {value}")))
    }
}

fn nonzero(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        Err(invalid(format!("{name} must be greater than zero")))
    } else {
        Ok(())
    }
}
