//! dxkit reasoning - adaptive differential-diagnosis inference.
//!
//! Narrows a retrieved candidate set by asking the most informative
//! question, updating a belief distribution after every answer and
//! reporting a ranked list with calibrated uncertainty.
//!
//! - **Belief state**: prevalence priors, sensitivity/specificity-weighted
//!   updates in log space, mandatory-symptom gates and pruning
//! - **Question selection**: mimic separation, global discriminability
//!   ranking, expected information gain, and duration and intensity
//!   clarifications
//! - **Intake**: free-text evidence extraction and temporal cues
//! - **Triage**: emergency rules and per-condition red flags
//! - **Uncertainty**: confidence intervals and quality labels
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dx_core::{Catalog, DxConfig, UserSymptomData};
//! use dx_reasoning::DiagnosisEngine;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = DiagnosisEngine::from_catalog(Catalog::from_path("conditions.json")?, DxConfig::default())?;
//!
//! let mut session = engine.start_session(&UserSymptomData::at(["head"])).await?;
//! while let Some(question) = session.next_question() {
//!     println!("{}", question.text);
//!     // option 0 is "yes" for token questions
//!     session.respond(&question, 0)?;
//! }
//!
//! let report = session.finish()?;
//! if let Some(top) = report.top() {
//!     println!("{} ({:.0}%)", top.condition.name, top.confidence_percent());
//! }
//! # Ok(())
//! # }
//! ```

pub mod belief;
pub mod errors;

pub mod temporal;
pub mod text;
pub mod triage;

pub mod clarify;
pub mod question;
pub mod selector;
pub mod uncertainty;

pub mod report;
pub mod session;
pub mod engine;

pub use belief::{
    likelihood, Answer, BeliefState, Confidence, ConfidenceError, Fallback, Hypothesis,
    HypothesisStatus, Likelihood, Polarity, PruneReport, ReasoningTraceEntry, SessionId, TraceKind,
};
pub use engine::DiagnosisEngine;
pub use errors::{ReasoningError, Result};
pub use clarify::{Clarification, ClarificationAnswer, Intensity};
pub use question::{CompoundQuestion, Question, Topic, NONE_OF_THE_ABOVE};
pub use report::{DiagnosisReport, DiagnosisResult, TerminalReason};
pub use selector::{QuestionChoice, QuestionSelector, SelectionReason};
pub use session::{DiagnosticSession, SessionPhase};
pub use text::EvidenceExtractor;
pub use triage::{TriageAlert, TriageLevel, TriageScanner};
pub use uncertainty::{
    CalibrationQuality, ConfidenceInterval, EvidenceMetrics, EvidenceQuality, UncertaintyEstimate,
    UncertaintyEstimator,
};

/// Version of the reasoning crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the reasoning crate
pub fn init() {
    tracing::info!("dxkit reasoning v{}", VERSION);
}
