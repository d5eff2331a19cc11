//! Error types for asdk-client
//!
//! The core components (transformation engine, polling machine, retrieval
//! pipeline) only propagate these errors. Turning them into something a user
//! can read happens once, at the session/CLI boundary, via `user_message`.

use crate::jobs::JobStatus;
use serde_json::Value;
use thiserror::Error;

/// Fallback message when nothing better can be extracted
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";

/// Fixed message for a job that ended in `Failed` or `Timed Out`
pub const JOB_FAILED_MESSAGE: &str =
    "We couldn't compute avatar for this photo. Please try another one.";

/// Client error type
#[derive(Debug, Error)]
pub enum AsdkError {
    /// Rejected before any request was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Service answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Network-level failure
    #[error("Network error: {0}")]
    Transport(String),

    /// Remote job reached `Failed` or `Timed Out`
    #[error("Job finished with status {status}")]
    JobFailed {
        status: JobStatus,
        /// Last snapshot fetched before giving up
        snapshot: Box<Value>,
    },

    /// Streaming download lacks the headers needed to size it
    #[error("Missing response header: {0}")]
    MissingHeader(String),

    /// Downloaded archive could not be read
    #[error("Archive error: {0}")]
    Archive(String),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Poll was cancelled through its token
    #[error("Operation cancelled")]
    Cancelled,

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AsdkError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            AsdkError::JobFailed { .. } => JOB_FAILED_MESSAGE.to_string(),
            AsdkError::Validation(msg)
            | AsdkError::Api { message: msg, .. }
            | AsdkError::NotFound(msg) => msg.clone(),
            AsdkError::Transport(msg) => msg.clone(),
            AsdkError::MissingHeader(_)
            | AsdkError::Archive(_)
            | AsdkError::Parse(_) => GENERIC_ERROR_MESSAGE.to_string(),
            AsdkError::Cancelled => self.to_string(),
        }
    }

    /// Whether this error is the expected "job did not succeed" outcome
    pub fn is_job_failure(&self) -> bool {
        matches!(self, AsdkError::JobFailed { .. })
    }
}

impl From<reqwest::Error> for AsdkError {
    fn from(e: reqwest::Error) -> Self {
        AsdkError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for AsdkError {
    fn from(e: serde_json::Error) -> Self {
        AsdkError::Parse(e.to_string())
    }
}

/// Pull a human-readable message out of an error body
///
/// Looks at `detail` first, then `statusText`; returns `fallback` when neither
/// is a non-empty string.
pub fn extract_error_message(body: &Value, fallback: &str) -> String {
    ["detail", "statusText"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| fallback.to_string())
}

/// Result type for client operations
pub type AsdkResult<T> = Result<T, AsdkError>;
