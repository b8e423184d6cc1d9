//! Error types for the turn pipeline.

use intake_core::error::IntakeError;

/// Errors surfaced to the caller of the pipeline.
///
/// Only structurally invalid requests reach the caller; extraction, merge,
/// schema, and write failures are contained inside the turn.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<IntakeError> for PipelineError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::SessionNotFound(id) => PipelineError::SessionNotFound(id),
            other => PipelineError::Storage(other.to_string()),
        }
    }
}
