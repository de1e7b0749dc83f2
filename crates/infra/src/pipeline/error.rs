use feedlens_core::DomainError;

use crate::connections::ConnectionError;
use crate::store::StoreError;

/// Caller-visible failure of a pipeline operation.
///
/// Classifier and broker trouble never shows up here; both are absorbed
/// (fallback analysis, direct store reads).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad input; the message is safe to return as-is.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The analysis succeeded but could not be recorded.
    #[error("failed to persist feedback: {0}")]
    Persistence(String),

    /// Any other store/connection failure during `operation`.
    #[error("{operation} failed: {detail}")]
    Internal {
        operation: &'static str,
        detail: String,
    },
}

impl PipelineError {
    pub(crate) fn internal(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Internal {
            operation,
            detail: err.to_string(),
        }
    }

    /// Message safe to show to the caller. Internal detail stays in logs.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Validation(msg) | PipelineError::NotFound(msg) => msg.clone(),
            PipelineError::Persistence(_) => "Failed to submit feedback".to_string(),
            PipelineError::Internal { operation, .. } => format!("Failed to {operation}"),
        }
    }
}

impl From<DomainError> for PipelineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => PipelineError::Validation(msg),
            other => PipelineError::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        PipelineError::Persistence(value.to_string())
    }
}

impl From<ConnectionError> for PipelineError {
    fn from(value: ConnectionError) -> Self {
        PipelineError::Persistence(value.to_string())
    }
}
