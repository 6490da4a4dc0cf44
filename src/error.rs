//! Error taxonomy of the pipeline.
//!
//! Provider outages and insufficient aggregates are *not* errors; they are
//! ordinary outcomes (`AdapterOutcome::Unavailable`, `PipelineOutcome::Rejected`).
//! Everything here aborts the run before any artifact is stored.

use chrono::NaiveDate;
use thiserror::Error;

/// Fatal failures of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Consent information could not be read; no subject may be used.
    #[error("consent store unavailable: {0}")]
    ConsentStore(String),

    /// Profile or interaction tables could not be read.
    #[error("data store unavailable: {0}")]
    DataStore(String),

    /// An artifact could not be rendered from the aggregate.
    #[error("failed to render {kind} artifact: {message}")]
    Render { kind: &'static str, message: String },

    /// A rendered artifact could not be persisted.
    #[error("failed to store {kind} artifact: {message}")]
    Storage { kind: &'static str, message: String },

    #[error("invalid period: end {end} is before start {start}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    /// The whole run exceeded its time budget.
    #[error("pipeline run exceeded {0}s")]
    Timeout(u64),
}

impl PipelineError {
    /// Whether re-running the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::InvalidPeriod { .. })
    }
}

/// Failures of the read-only data store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store read timed out after {0}s")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::ConsentStore("down".to_string()).is_retryable());
        assert!(PipelineError::Storage {
            kind: "export",
            message: "bucket missing".to_string()
        }
        .is_retryable());

        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(!PipelineError::InvalidPeriod { start, end }.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::Render {
            kind: "narrative",
            message: "empty".to_string(),
        };
        assert_eq!(err.to_string(), "failed to render narrative artifact: empty");
    }
}
