//! Hybrid Retrieval.
//!
//! Narrows the catalog to an initial candidate set in named stages:
//!
//! 1. [`SemanticStage`]: embed the symptom text, vector-search the store,
//!    hydrate the hits.
//! 2. [`StructuralStage`]: location buckets plus direct location overlap,
//!    over the local catalog and (cached) store rows.
//! 3. [`MergeStage`]: dedupe by ID, the store's record wins. Semantic hits
//!    keep their similarity order; structural candidates come out in ID order.
//! 4. [`FullCatalogStage`]: everything, when nothing else produced a candidate.
//!
//! Upstream failures are logged and recorded as [`Degradation`]s; they never
//! reach the caller. For a non-empty catalog the result is never empty.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{RetrievalCache, RetrievalKey};
use crate::condition::{Condition, ConditionId};
use crate::config::RetrievalConfig;
use crate::embedding::{DisabledEmbeddings, EmbeddingProvider};
use crate::error::FetchError;
use crate::index_store::IndexStore;
use crate::location::{buckets_for, direct_location_overlap, LocationBucket};
use crate::store::ConditionStore;

/// What the user reported before any question was asked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSymptomData {
    #[serde(default, rename = "location")]
    pub locations: Vec<String>,
    #[serde(default)]
    pub pain_type: Option<String>,
    #[serde(default)]
    pub triggers: Option<String>,
    /// Free-form, e.g. "3 days" or "a few weeks"
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    /// 1-10
    #[serde(default)]
    pub intensity: Option<u8>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    /// Symptoms the user has already denied
    #[serde(default)]
    pub excluded_symptoms: Vec<String>,
}

impl UserSymptomData {
    pub fn at<S: Into<String>>(locations: impl IntoIterator<Item = S>) -> Self {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Location, pain type and notes joined into one query string.
    pub fn query_text(&self) -> String {
        let mut parts: Vec<&str> = self.locations.iter().map(String::as_str).collect();
        parts.extend(self.pain_type.as_deref());
        parts.extend(self.additional_notes.as_deref());
        parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Semantic,
    Structural,
    FullCatalog,
}

/// A fallback taken during retrieval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: RetrievalStage,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct RetrievalOutcome {
    pub candidates: Vec<Arc<Condition>>,
    /// Stage that produced `candidates`
    pub stage: RetrievalStage,
    pub degradations: Vec<Degradation>,
}

async fn bounded<T>(
    service: &'static str,
    budget: Duration,
    fut: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            service,
            timeout: budget,
        }),
    }
}

/// Embedding + vector search + hydration.
pub struct SemanticStage<'a> {
    pub embeddings: &'a dyn EmbeddingProvider,
    pub store: Option<&'a dyn ConditionStore>,
    pub config: &'a RetrievalConfig,
}

impl SemanticStage<'_> {
    /// Hydrated store records for the query, best match first.
    ///
    /// An empty embedding or a missing store yields `Ok(vec![])`.
    pub async fn run(&self, query: &str) -> Result<Vec<Condition>, FetchError> {
        let Some(store) = self.store else {
            return Ok(Vec::new());
        };

        let embedding = bounded(
            "embedding service",
            self.config.embedding_timeout(),
            self.embeddings.embed(query),
        )
        .await?;
        if embedding.is_empty() {
            tracing::debug!("No embedding available, skipping vector search");
            return Ok(Vec::new());
        }

        let hits = bounded(
            "condition store",
            self.config.store_timeout(),
            store.match_conditions(
                &embedding,
                self.config.similarity_threshold,
                self.config.match_count,
            ),
        )
        .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ConditionId> = hits.iter().map(|h| h.id.clone()).collect();
        let mut rows = bounded(
            "condition store",
            self.config.store_timeout(),
            store.fetch_by_ids(&ids),
        )
        .await?;

        let rank: BTreeMap<&ConditionId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        rows.sort_by_key(|c| rank.get(&c.id).copied().unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Location-bucket and direct-overlap filtering.
pub struct StructuralStage<'a> {
    pub index: &'a IndexStore,
}

impl StructuralStage<'_> {
    /// Query buckets for the user's locations; `general` is always included.
    pub fn query_buckets<S: AsRef<str>>(locations: &[S]) -> BTreeSet<LocationBucket> {
        let mut buckets = buckets_for(locations);
        buckets.insert(LocationBucket::General);
        buckets
    }

    /// Local catalog conditions that share a bucket with the query or overlap a reported location.
    pub fn local<S: AsRef<str>>(
        &self,
        locations: &[S],
        buckets: &BTreeSet<LocationBucket>,
    ) -> Vec<Arc<Condition>> {
        let by_bucket = self.index.buckets().conditions_in_any(buckets);
        self.index
            .catalog()
            .iter()
            .filter(|c| {
                by_bucket.contains(&c.id)
                    || direct_location_overlap(&c.match_criteria.locations, locations)
            })
            .cloned()
            .collect()
    }

    /// Store rows that fall in one of `buckets` or overlap a reported location.
    pub fn filter_rows<S: AsRef<str>>(
        rows: impl IntoIterator<Item = Condition>,
        locations: &[S],
        buckets: &BTreeSet<LocationBucket>,
    ) -> Vec<Condition> {
        rows.into_iter()
            .filter(|c| {
                let own = buckets_for(&c.match_criteria.locations);
                !own.is_disjoint(buckets)
                    || direct_location_overlap(&c.match_criteria.locations, locations)
            })
            .collect()
    }
}

pub struct MergeStage;

impl MergeStage {
    /// Deduplicates ranked rows, keeping the first occurrence in rank order.
    pub fn dedupe_ranked(rows: Vec<Condition>) -> Vec<Arc<Condition>> {
        let mut seen = BTreeSet::new();
        rows.into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .map(Arc::new)
            .collect()
    }

    /// Deduplicates by ID in ID order; a store record replaces a local one.
    pub fn merge(local: Vec<Arc<Condition>>, store: Vec<Condition>) -> Vec<Arc<Condition>> {
        let mut merged: BTreeMap<ConditionId, Arc<Condition>> = BTreeMap::new();
        for condition in local {
            merged.insert(condition.id.clone(), condition);
        }
        for condition in store {
            merged.insert(condition.id.clone(), Arc::new(condition));
        }
        merged.into_values().collect()
    }
}

pub struct FullCatalogStage<'a> {
    pub index: &'a IndexStore,
    pub store: Option<&'a dyn ConditionStore>,
    pub config: &'a RetrievalConfig,
}

impl FullCatalogStage<'_> {
    /// The local catalog, or the whole store when the local catalog is empty.
    pub async fn run(&self) -> Result<Vec<Arc<Condition>>, FetchError> {
        if !self.index.catalog().is_empty() {
            return Ok(self.index.catalog().all());
        }
        match self.store {
            Some(store) => {
                let rows = bounded("condition store", self.config.store_timeout(), store.fetch_all()).await?;
                Ok(MergeStage::merge(Vec::new(), rows))
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Semantic recall with a structural fallback over a shared [`IndexStore`].
pub struct HybridRetriever {
    index: Arc<IndexStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Option<Arc<dyn ConditionStore>>,
    cache: RetrievalCache,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// Local-only retriever: no embeddings, no store.
    pub fn new(index: Arc<IndexStore>, config: RetrievalConfig) -> Self {
        Self {
            index,
            embeddings: Arc::new(DisabledEmbeddings),
            store: None,
            cache: RetrievalCache::from_config(&config),
            config,
        }
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = embeddings;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConditionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn index(&self) -> &Arc<IndexStore> {
        &self.index
    }

    pub fn cache(&self) -> &RetrievalCache {
        &self.cache
    }

    /// Swaps in a rebuilt index and drops cache entries of the old catalog.
    pub async fn replace_index(&mut self, index: Arc<IndexStore>) {
        let old = self.index.version().clone();
        self.index = index;
        if &old != self.index.version() {
            self.cache.invalidate_version(&old).await;
        }
    }

    pub async fn retrieve(&self, data: &UserSymptomData) -> Vec<Arc<Condition>> {
        self.retrieve_traced(data).await.candidates
    }

    pub async fn retrieve_traced(&self, data: &UserSymptomData) -> RetrievalOutcome {
        let mut degradations = Vec::new();
        let store = self.store.as_deref();

        let semantic = SemanticStage {
            embeddings: self.embeddings.as_ref(),
            store,
            config: &self.config,
        };
        let semantic_rows = match semantic.run(&data.query_text()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Semantic retrieval failed, using structural filter");
                degradations.push(Degradation {
                    stage: RetrievalStage::Semantic,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        if semantic_rows.len() >= self.config.min_semantic_candidates {
            tracing::debug!(candidates = semantic_rows.len(), "Semantic retrieval succeeded");
            return RetrievalOutcome {
                candidates: MergeStage::dedupe_ranked(semantic_rows),
                stage: RetrievalStage::Semantic,
                degradations,
            };
        }
        if store.is_some() {
            tracing::warn!(
                hits = semantic_rows.len(),
                min = self.config.min_semantic_candidates,
                "Vector search yielded few results, falling back to location filter"
            );
        }

        let structural = StructuralStage { index: &self.index };
        let buckets = StructuralStage::query_buckets(&data.locations);
        let local = structural.local(&data.locations, &buckets);
        let store_rows = self.structural_store_rows(&data.locations, &buckets, &mut degradations).await;
        let candidates = MergeStage::merge(local, store_rows);

        if !candidates.is_empty() {
            tracing::debug!(candidates = candidates.len(), "Structural retrieval succeeded");
            return RetrievalOutcome {
                candidates,
                stage: RetrievalStage::Structural,
                degradations,
            };
        }

        tracing::warn!("Structural retrieval found nothing, returning the full catalog");
        let full = FullCatalogStage {
            index: &self.index,
            store,
            config: &self.config,
        };
        let candidates = match full.run().await {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!(error = %e, "Full catalog fetch failed");
                degradations.push(Degradation {
                    stage: RetrievalStage::FullCatalog,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        RetrievalOutcome {
            candidates,
            stage: RetrievalStage::FullCatalog,
            degradations,
        }
    }

    async fn structural_store_rows(
        &self,
        locations: &[String],
        buckets: &BTreeSet<LocationBucket>,
        degradations: &mut Vec<Degradation>,
    ) -> Vec<Condition> {
        let Some(store) = self.store.as_deref() else {
            return Vec::new();
        };

        let key = RetrievalKey::new(self.index.version(), buckets);
        if let Some(rows) = self.cache.get(&key).await {
            tracing::debug!(buckets = %key.signature(), "Retrieval cache hit");
            return rows.as_ref().clone();
        }

        match bounded("condition store", self.config.store_timeout(), store.fetch_all()).await {
            Ok(rows) => {
                let rows = StructuralStage::filter_rows(rows, locations, buckets);
                self.cache.insert(key, rows.clone()).await;
                rows
            }
            Err(e) => {
                tracing::warn!(error = %e, "Condition store unavailable, using local catalog only");
                degradations.push(Degradation {
                    stage: RetrievalStage::Structural,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}
