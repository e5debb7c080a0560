//! Error types for the knowledge-base side of dxkit.

use std::time::Duration;

/// Main error type for catalog, index and configuration operations.
///
/// All fallible `dx_core` operations return `Result<T> = std::result::Result<T, DxError>`.
#[derive(thiserror::Error, Debug)]
pub enum DxError {
    /// Two catalog sources declare the same condition ID and no override allows it.
    #[error("Duplicate condition '{id}' in sources '{first}' and '{second}'")]
    DuplicateCondition {
        /// The colliding condition ID
        id: String,
        /// Source that declared it first
        first: String,
        /// Source that declared it again
        second: String,
    },

    /// A catalog entry cannot be indexed.
    #[error("Malformed condition '{id}': {reason}")]
    MalformedCondition {
        /// Offending condition ID (may be empty)
        id: String,
        /// What is wrong with it
        reason: String,
    },

    /// A configuration value is outside its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Upstream service failure that reached a caller instead of a fallback.
    #[error("Upstream error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures of the embedding service or the condition store.
///
/// These never abort a diagnosis: retrieval logs them and moves to the next
/// fallback stage.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The call did not complete within its budget.
    #[error("{service} timed out after {timeout:?}")]
    Timeout {
        /// Which upstream timed out
        service: &'static str,
        /// The budget that elapsed
        timeout: Duration,
    },

    /// Connection or protocol failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("Upstream returned {code}: {body}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// No upstream is configured.
    #[error("Upstream not available: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Type alias for Result with DxError.
pub type Result<T> = std::result::Result<T, DxError>;
