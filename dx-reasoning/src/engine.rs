//! Engine facade
//!
//! [`DiagnosisEngine`] ties the shared knowledge base to per-session
//! inference. It is the surface the host application talks to:
//!
//! - [`DiagnosisEngine::retrieve`]: candidate conditions for an intake
//! - [`DiagnosisEngine::best_question`]: next token from the global ranking
//! - [`DiagnosisEngine::run_inference`]: stateless scoring of answers so far
//! - [`DiagnosisEngine::start_session`]: an adaptive question loop
//!
//! The engine itself holds no per-user state and can be shared behind an
//! `Arc` by concurrent requests.

use std::collections::BTreeSet;
use std::sync::Arc;

use dx_core::{
    Catalog, Condition, ConditionStore, DxConfig, EmbeddingProvider, HybridRetriever, IndexStore,
    QuestionToken, RetrievalOutcome, UserSymptomData,
};

use crate::belief::Answer;
use crate::errors::Result;
use crate::report::DiagnosisResult;
use crate::selector::QuestionSelector;
use crate::session::DiagnosticSession;
use crate::text::EvidenceExtractor;
use crate::triage::TriageScanner;

pub struct DiagnosisEngine {
    config: DxConfig,
    retriever: HybridRetriever,
    extractor: EvidenceExtractor,
    triage: TriageScanner,
}

impl DiagnosisEngine {
    /// Local-only engine over a prebuilt index.
    pub fn new(index: Arc<IndexStore>, config: DxConfig) -> Result<Self> {
        config.validate()?;
        let retriever = HybridRetriever::new(index, config.retrieval.clone());
        tracing::info!(
            conditions = retriever.index().catalog().len(),
            version = %retriever.index().version(),
            strategy = ?config.engine.selection_strategy,
            "Diagnosis engine ready"
        );
        Ok(Self {
            config,
            retriever,
            extractor: EvidenceExtractor::new()?,
            triage: TriageScanner::new()?,
        })
    }

    /// Builds the indices from `catalog` and wraps them in an engine.
    pub fn from_catalog(catalog: Catalog, config: DxConfig) -> Result<Self> {
        let index = IndexStore::shared(catalog, &config.index);
        Self::new(index, config)
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.retriever = self.retriever.with_embeddings(embeddings);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConditionStore>) -> Self {
        self.retriever = self.retriever.with_store(store);
        self
    }

    pub fn index(&self) -> &Arc<IndexStore> {
        self.retriever.index()
    }

    pub fn config(&self) -> &DxConfig {
        &self.config
    }

    /// Candidate conditions for the user's intake. Never empty for a
    /// non-empty catalog.
    pub async fn retrieve(&self, data: &UserSymptomData) -> Vec<Arc<Condition>> {
        self.retriever.retrieve(data).await
    }

    /// Like [`retrieve`](Self::retrieve), with the producing stage and any
    /// degradations.
    pub async fn retrieve_traced(&self, data: &UserSymptomData) -> RetrievalOutcome {
        self.retriever.retrieve_traced(data).await
    }

    /// Highest-ranked catalog-wide token not yet known or excluded.
    /// Generic infection triggers are skipped.
    pub fn best_question(
        &self,
        known: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Option<QuestionToken> {
        self.index()
            .symptoms()
            .ranking()
            .iter()
            .map(|q| &q.token)
            .find(|t| {
                let key = t.key();
                !known.contains(&key)
                    && !excluded.contains(&key)
                    && !QuestionSelector::is_blacklisted(t)
            })
            .cloned()
    }

    /// Score `candidates` against the answers given so far.
    ///
    /// Answers are applied in order with later answers overriding earlier
    /// ones for the same token. Results are ranked best first and are never
    /// empty for a non-empty candidate list.
    pub fn run_inference(
        &self,
        candidates: &[Arc<Condition>],
        answers: &[Answer],
    ) -> Result<Vec<DiagnosisResult>> {
        let mut session = self.session_with(candidates.to_vec(), &UserSymptomData::default())?;
        session.replay(answers.iter().cloned())?;
        tracing::debug!(
            candidates = candidates.len(),
            answers = answers.len(),
            "Inference run"
        );
        session.results()
    }

    /// Retrieve candidates for `data` and open a session over them.
    pub async fn start_session(&self, data: &UserSymptomData) -> Result<DiagnosticSession> {
        let candidates = self.retrieve(data).await;
        self.session_with(candidates, data)
    }

    /// Open a session over an explicit candidate set.
    pub fn session_with(
        &self,
        candidates: Vec<Arc<Condition>>,
        data: &UserSymptomData,
    ) -> Result<DiagnosticSession> {
        DiagnosticSession::start(
            Arc::clone(self.index()),
            self.config.engine.clone(),
            candidates,
            data,
            &self.extractor,
            self.triage.clone(),
        )
    }

    /// Swap in a rebuilt index. Sessions already started keep the index
    /// they were opened with.
    pub async fn replace_index(&mut self, index: Arc<IndexStore>) {
        self.retriever.replace_index(index).await;
    }
}
