//! Bounded cache of store-backed retrieval results.
//!
//! Entries are keyed by catalog version and bucket signature, so results
//! computed against an older catalog are never served after a rebuild.
//! Capacity is enforced with least-recently-used eviction and every entry
//! expires after the configured TTL.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::catalog::CatalogVersion;
use crate::condition::Condition;
use crate::config::RetrievalConfig;
use crate::location::LocationBucket;

/// Cache key: catalog version plus the sorted set of query buckets.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RetrievalKey {
    pub version: CatalogVersion,
    pub buckets: Vec<LocationBucket>,
}

impl RetrievalKey {
    pub fn new(version: &CatalogVersion, buckets: &BTreeSet<LocationBucket>) -> Self {
        Self {
            version: version.clone(),
            buckets: buckets.iter().copied().collect(),
        }
    }

    /// `abdomen|general`-style signature, for logs.
    pub fn signature(&self) -> String {
        self.buckets
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    conditions: Arc<Vec<Condition>>,
    expires_at: Instant,
}

struct CacheInner {
    entries: HashMap<RetrievalKey, CacheEntry>,
    /// Least recently used first
    order: VecDeque<RetrievalKey>,
}

impl CacheInner {
    fn forget(&mut self, key: &RetrievalKey) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }

    fn touch(&mut self, key: &RetrievalKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

#[derive(Clone)]
pub struct RetrievalCache {
    capacity: usize,
    ttl: Duration,
    inner: Arc<RwLock<CacheInner>>,
}

impl RetrievalCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            })),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.cache_capacity, config.cache_ttl())
    }

    /// Cached rows for `key`, unless missing or expired.
    pub async fn get(&self, key: &RetrievalKey) -> Option<Arc<Vec<Condition>>> {
        let mut inner = self.inner.write().await;
        let entry = inner.entries.get(key).cloned()?;

        if Instant::now() >= entry.expires_at {
            inner.forget(key);
            return None;
        }
        inner.touch(key);
        Some(entry.conditions)
    }

    pub async fn insert(&self, key: RetrievalKey, conditions: Vec<Condition>) -> Arc<Vec<Condition>> {
        let conditions = Arc::new(conditions);
        let mut inner = self.inner.write().await;

        if inner.entries.contains_key(&key) {
            inner.touch(&key);
        } else {
            while inner.order.len() >= self.capacity {
                match inner.order.pop_front() {
                    Some(evicted) => {
                        tracing::debug!(buckets = %evicted.signature(), "Evicting cached retrieval");
                        inner.entries.remove(&evicted);
                    }
                    None => break,
                }
            }
            inner.order.push_back(key.clone());
        }

        inner.entries.insert(
            key,
            CacheEntry {
                conditions: Arc::clone(&conditions),
                expires_at: Instant::now() + self.ttl,
            },
        );
        conditions
    }

    pub async fn invalidate(&self, key: &RetrievalKey) {
        self.inner.write().await.forget(key);
    }

    /// Drops every entry computed against `version`.
    pub async fn invalidate_version(&self, version: &CatalogVersion) {
        let mut inner = self.inner.write().await;
        inner.entries.retain(|k, _| &k.version != version);
        inner.order.retain(|k| &k.version != version);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}
