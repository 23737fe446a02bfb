//! Error types for the orchestration core.

use std::time::Duration;

use crate::admission::OperationCategory;

/// Top-level error type for the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Admission-control errors.
///
/// The controller never interprets the outcome of submitted work, so the
/// only error it raises on its own behalf is cancellation of a queued or
/// active operation.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Operation for {key} ({category}) was cancelled")]
    Cancelled {
        category: OperationCategory,
        key: String,
    },
}

/// Capability selection and fallback errors.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("No inference capability is currently available")]
    NoneAvailable,

    #[error("All candidates exhausted for {task} after {attempts} attempts")]
    Exhausted { task: &'static str, attempts: usize },

    #[error("Capability {capability} timed out after {timeout:?}")]
    Timeout {
        capability: String,
        timeout: Duration,
    },

    #[error("Capability {capability} request failed: {reason}")]
    RequestFailed { capability: String, reason: String },

    #[error("Availability probe failed: {0}")]
    ProbeFailed(String),
}

/// Signal-extraction errors (raised by the `SignalExtractor` collaborator).
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Failed to fetch content from {origin}: {reason}")]
    FetchFailed { origin: String, reason: String },

    #[error("Failed to extract signals from {origin}: {reason}")]
    SignalsFailed { origin: String, reason: String },
}

/// Policy store errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to load policy: {0}")]
    LoadFailed(String),

    #[error("Failed to persist policy: {0}")]
    SaveFailed(String),
}

/// Result cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache operation failed: {0}")]
    Failed(String),
}

/// Result type alias for the orchestration core.
pub type Result<T> = std::result::Result<T, Error>;
