//! Error types for the inference side

use thiserror::Error;

use crate::belief::confidence::ConfidenceError;
use crate::belief::hypothesis::SessionId;

/// Main error type for diagnostic sessions
#[derive(Error, Debug)]
pub enum ReasoningError {
    /// Knowledge-base errors
    #[error("Knowledge base error: {0}")]
    Core(#[from] dx_core::DxError),

    /// An answer that cannot be applied
    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    /// Invalid state or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    /// The session already reached a terminal state
    #[error("Session {0} is terminated")]
    SessionTerminated(SessionId),

    #[error("Confidence error: {0}")]
    Confidence(#[from] ConfidenceError),

    /// A built-in text pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type alias for reasoning operations
pub type Result<T> = std::result::Result<T, ReasoningError>;
