//! Embedding service client.
//!
//! The engine never produces embeddings itself; it asks an external service
//! to map the user's symptom text to a vector. An empty vector means "no
//! embedding available" and sends retrieval down the structural path.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds `text`. An empty vector is a valid, non-error answer.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, FetchError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// `POST {base_url}/api/embeddings {text}` → `{embedding}`.
#[derive(Clone, Debug)]
pub struct HttpEmbeddingClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpEmbeddingClient {
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, FetchError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut req = self.client.post(&url).json(&EmbeddingRequest { text });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { code, body });
        }

        let body: EmbeddingResponse = resp.json().await?;
        Ok(body.embedding)
    }
}

/// Provider for keyword-only deployments: always answers with no embedding.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledEmbeddings;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, FetchError> {
        Ok(Vec::new())
    }
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
