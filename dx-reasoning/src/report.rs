//! Externally visible diagnosis output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use dx_core::Condition;

use crate::belief::{Confidence, ReasoningTraceEntry, SessionId};
use crate::triage::TriageAlert;
use crate::uncertainty::UncertaintyEstimate;

/// Why a session stopped asking questions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The leading candidate reached the early-exit confidence
    Confident,
    /// No remaining token splits the candidates well enough
    NoInformativeQuestion,
    /// At most one admissible candidate is left
    SingleCandidate,
    /// Nothing survived pruning; the result is a fallback
    Exhausted,
}

/// One ranked diagnosis.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub condition: Arc<Condition>,
    pub confidence: Confidence,
    pub matched_keywords: Vec<String>,
    pub reasoning_trace: Vec<ReasoningTraceEntry>,
    pub uncertainty: UncertaintyEstimate,
    pub uncertainty_flag: bool,
    /// Reported only because every candidate was pruned
    pub is_fallback: bool,
}

impl DiagnosisResult {
    pub fn confidence_percent(&self) -> f64 {
        self.confidence.percent()
    }
}

/// Final outcome of a session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub session_id: SessionId,
    pub results: Vec<DiagnosisResult>,
    pub alerts: Vec<TriageAlert>,
    pub terminal_reason: Option<TerminalReason>,
    pub questions_asked: usize,
    pub completed_at: DateTime<Utc>,
}

impl DiagnosisReport {
    pub fn top(&self) -> Option<&DiagnosisResult> {
        self.results.first()
    }

    pub fn has_emergency(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| a.level == crate::triage::TriageLevel::Emergency)
    }
}
