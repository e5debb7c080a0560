//! Condition store clients.
//!
//! The store holds one row per condition plus its embedding. It is consumed
//! through two calls: a similarity-search RPC and a plain row fetch by ID
//! list. [`HttpConditionStore`] speaks the PostgREST dialect;
//! [`InMemoryConditionStore`] answers the same calls from memory.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::condition::{
    Condition, ConditionId, Exercise, MatchCriteria, Prevalence, Remedy, Severity,
};
use crate::embedding::cosine_similarity;
use crate::error::FetchError;

/// Seek-help text for rows that carry none.
pub const DEFAULT_SEEK_HELP: &str = "Consult a doctor.";

/// Columns fetched when hydrating rows (everything but the embedding).
const ROW_COLUMNS: &str = "id,name,description,match_criteria,severity,prevalence,red_flags,\
mandatory_symptoms,mimics,remedies,indian_home_remedies,exercises,warnings,seek_help";

/// One row of the `conditions` table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub match_criteria: Option<MatchCriteria>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub prevalence: Option<Prevalence>,
    #[serde(default)]
    pub red_flags: Option<Vec<String>>,
    #[serde(default)]
    pub mandatory_symptoms: Option<Vec<String>>,
    #[serde(default)]
    pub mimics: Option<Vec<ConditionId>>,
    #[serde(default)]
    pub remedies: Option<Vec<Remedy>>,
    #[serde(default)]
    pub indian_home_remedies: Option<Vec<Remedy>>,
    #[serde(default)]
    pub exercises: Option<Vec<Exercise>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub seek_help: Option<String>,
}

impl From<ConditionRow> for Condition {
    fn from(row: ConditionRow) -> Self {
        Condition {
            id: ConditionId(row.id),
            name: row.name,
            description: row.description.unwrap_or_default(),
            match_criteria: row.match_criteria.unwrap_or_default(),
            severity: row.severity.unwrap_or_default(),
            prevalence: row.prevalence,
            red_flags: row.red_flags.unwrap_or_default(),
            mandatory_symptoms: row.mandatory_symptoms.unwrap_or_default(),
            mimics: row.mimics.unwrap_or_default(),
            remedies: row.remedies.unwrap_or_default(),
            indian_home_remedies: row.indian_home_remedies.unwrap_or_default(),
            exercises: row.exercises.unwrap_or_default(),
            warnings: row.warnings.unwrap_or_default(),
            seek_help: row
                .seek_help
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SEEK_HELP.to_string()),
        }
        .normalized()
    }
}

/// A similarity-search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub id: ConditionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub similarity: f64,
}

#[async_trait]
pub trait ConditionStore: Send + Sync {
    /// Conditions whose embedding is at least `threshold`-similar to `embedding`, best first.
    async fn match_conditions(
        &self,
        embedding: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<SimilarityMatch>, FetchError>;

    /// Full records for `ids`. Unknown IDs are silently absent.
    async fn fetch_by_ids(&self, ids: &[ConditionId]) -> Result<Vec<Condition>, FetchError>;

    async fn fetch_all(&self) -> Result<Vec<Condition>, FetchError>;
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_threshold: f64,
    match_count: usize,
}

/// PostgREST-backed store (`/rest/v1/...`).
#[derive(Clone, Debug)]
pub struct HttpConditionStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpConditionStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("apikey", key).bearer_auth(key),
            None => req,
        }
    }

    async fn rows(&self, req: reqwest::RequestBuilder) -> Result<Vec<Condition>, FetchError> {
        let resp = self.authorize(req).send().await?;
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { code, body });
        }
        let rows: Vec<ConditionRow> = resp.json().await?;
        Ok(rows.into_iter().map(Condition::from).collect())
    }
}

#[async_trait]
impl ConditionStore for HttpConditionStore {
    async fn match_conditions(
        &self,
        embedding: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<SimilarityMatch>, FetchError> {
        let url = format!("{}/rest/v1/rpc/match_conditions", self.base_url);
        let req = self.client.post(&url).json(&MatchRequest {
            query_embedding: embedding,
            match_threshold: threshold,
            match_count: count,
        });

        let resp = self.authorize(req).send().await?;
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { code, body });
        }
        Ok(resp.json().await?)
    }

    async fn fetch_by_ids(&self, ids: &[ConditionId]) -> Result<Vec<Condition>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids
            .iter()
            .map(|id| format!("\"{}\"", id.as_str().replace('"', "")))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/rest/v1/conditions", self.base_url);
        let req = self
            .client
            .get(&url)
            .query(&[("select", ROW_COLUMNS.to_string()), ("id", format!("in.({})", list))]);
        self.rows(req).await
    }

    async fn fetch_all(&self) -> Result<Vec<Condition>, FetchError> {
        let url = format!("{}/rest/v1/conditions", self.base_url);
        let req = self.client.get(&url).query(&[("select", ROW_COLUMNS)]);
        self.rows(req).await
    }
}

/// Store held entirely in memory, with optional per-condition embeddings.
#[derive(Clone, Debug, Default)]
pub struct InMemoryConditionStore {
    rows: BTreeMap<ConditionId, (Condition, Vec<f32>)>,
}

impl InMemoryConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conditions(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut store = Self::new();
        for condition in conditions {
            store.insert(condition, Vec::new());
        }
        store
    }

    pub fn insert(&mut self, condition: Condition, embedding: Vec<f32>) {
        let condition = condition.normalized();
        self.rows.insert(condition.id.clone(), (condition, embedding));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl ConditionStore for InMemoryConditionStore {
    async fn match_conditions(
        &self,
        embedding: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<SimilarityMatch>, FetchError> {
        let mut hits: Vec<SimilarityMatch> = self
            .rows
            .values()
            .filter_map(|(condition, stored)| {
                let similarity = cosine_similarity(embedding, stored);
                (!stored.is_empty() && similarity >= threshold).then(|| SimilarityMatch {
                    id: condition.id.clone(),
                    name: condition.name.clone(),
                    description: condition.description.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(count);
        Ok(hits)
    }

    async fn fetch_by_ids(&self, ids: &[ConditionId]) -> Result<Vec<Condition>, FetchError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.rows.get(id).map(|(c, _)| c.clone()))
            .collect())
    }

    async fn fetch_all(&self) -> Result<Vec<Condition>, FetchError> {
        Ok(self.rows.values().map(|(c, _)| c.clone()).collect())
    }
}
