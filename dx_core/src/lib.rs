//! dxkit core - knowledge base and retrieval for differential diagnosis.
//!
//! This crate owns everything that is shared, read-only and process-wide:
//!
//! - **Catalog**: validated condition records with an explicit duplicate policy
//! - **Location Bucket Index**: coarse anatomical partition of the catalog
//! - **Symptom Discriminability Index**: inverted token index and global question ranking
//! - **Hybrid Retrieval**: semantic search with a structural fallback
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dx_core::{Catalog, DxConfig, HybridRetriever, IndexStore, UserSymptomData};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = DxConfig::default();
//! let catalog = Catalog::from_path("conditions.json")?;
//! let index = IndexStore::shared(catalog, &config.index);
//!
//! let retriever = HybridRetriever::new(Arc::clone(&index), config.retrieval.clone());
//! let candidates = retriever.retrieve(&UserSymptomData::at(["head"])).await;
//! println!("{} candidates", candidates.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`condition`]: Condition data model
//! - [`catalog`]: Catalog loading and validation
//! - [`location`]: Location Bucket Index
//! - [`symptom_index`]: Symptom Discriminability Index
//! - [`index_store`]: Shared index container
//! - [`retrieval`]: Hybrid Retrieval
//! - [`embedding`] / [`store`]: upstream clients
//! - [`cache`]: Bounded retrieval cache
//! - [`config`]: Tunables

pub mod error;
pub mod condition;
pub mod catalog;
pub mod config;

pub mod location;
pub mod symptom_index;
pub mod index_store;

pub mod cache;
pub mod embedding;
pub mod store;
pub mod retrieval;

pub use error::{DxError, FetchError, Result};
pub use condition::{
    normalize_token, Condition, ConditionId, DurationHint, MatchCriteria, Onset, Prevalence,
    Progression, ResolvedWeight, Severity, SymptomWeight, TokenKind,
};
pub use catalog::{Catalog, CatalogSource, CatalogVersion, DuplicatePolicy, SkippedEntry};
pub use config::{DxConfig, EngineConfig, IndexConfig, RetrievalConfig, SelectionStrategy};
pub use location::{buckets_for, LocationBucket, LocationBucketIndex};
pub use symptom_index::{QuestionToken, RankedQuestion, SymptomIndex};
pub use index_store::IndexStore;
pub use cache::{RetrievalCache, RetrievalKey};
pub use embedding::{DisabledEmbeddings, EmbeddingProvider, HttpEmbeddingClient};
pub use store::{ConditionRow, ConditionStore, HttpConditionStore, InMemoryConditionStore, SimilarityMatch};
pub use retrieval::{
    Degradation, HybridRetriever, RetrievalOutcome, RetrievalStage, UserSymptomData,
};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the core crate
pub fn init() {
    tracing::info!("dxkit core v{}", VERSION);
}
