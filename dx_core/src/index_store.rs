//! Process-wide, read-only knowledge-base indices.
//!
//! Built once at startup and shared as `Arc<IndexStore>`. A catalog reload
//! goes through [`IndexStore::rebuild`], which swaps every index at once.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogVersion};
use crate::condition::Condition;
use crate::config::IndexConfig;
use crate::location::{buckets_for, LocationBucket, LocationBucketIndex};
use crate::symptom_index::{QuestionToken, SymptomIndex};

#[derive(Clone, Debug)]
pub struct IndexStore {
    catalog: Catalog,
    buckets: LocationBucketIndex,
    symptoms: SymptomIndex,
    config: IndexConfig,
}

impl IndexStore {
    pub fn build(catalog: Catalog, config: &IndexConfig) -> Self {
        let buckets = LocationBucketIndex::build(&catalog);
        let symptoms = SymptomIndex::build(&catalog, config);

        tracing::info!(
            conditions = catalog.len(),
            buckets = buckets.bucket_count(),
            tokens = symptoms.len(),
            ranked_questions = symptoms.ranking().len(),
            skipped = catalog.skipped().len(),
            version = %catalog.version(),
            "Knowledge-base indices built"
        );

        Self {
            catalog,
            buckets,
            symptoms,
            config: config.clone(),
        }
    }

    pub fn shared(catalog: Catalog, config: &IndexConfig) -> Arc<Self> {
        Arc::new(Self::build(catalog, config))
    }

    /// Replaces the catalog and both indices.
    pub fn rebuild(&mut self, catalog: Catalog) {
        let config = self.config.clone();
        *self = Self::build(catalog, &config);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn version(&self) -> &CatalogVersion {
        self.catalog.version()
    }

    pub fn buckets(&self) -> &LocationBucketIndex {
        &self.buckets
    }

    pub fn symptoms(&self) -> &SymptomIndex {
        &self.symptoms
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Condition>> {
        self.catalog.get(id)
    }

    pub fn buckets_for<S: AsRef<str>>(&self, locations: &[S]) -> BTreeSet<LocationBucket> {
        buckets_for(locations)
    }

    pub fn best_question(
        &self,
        known: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Option<&QuestionToken> {
        self.symptoms.best_question(known, excluded)
    }
}
