//! Error types for the stream reducer

use crate::artifacts::WriteError;
use thiserror::Error;

/// Result type alias for agent-workflow
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised while driving an analysis run
///
/// `Request` is rejected before the pipeline starts. `Pipeline` and `Signal`
/// fail the run. `Write` is reported per artifact and never fails a run on
/// its own.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed run request
    #[error("Invalid request: {0}")]
    Request(String),

    /// Failure while pulling or processing chunks
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// The signal extractor failed
    #[error("Signal extraction failed: {0}")]
    Signal(String),

    /// An artifact could not be written
    #[error("Failed to write {section}: {source}")]
    Write {
        section: String,
        #[source]
        source: WriteError,
    },

    /// Invalid driver configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<agent_core::Error> for WorkflowError {
    fn from(err: agent_core::Error) -> Self {
        match err {
            agent_core::Error::InvalidRequest(message) => Self::Request(message),
            agent_core::Error::Pipeline(message) => Self::Pipeline(message),
            other => Self::Pipeline(other.to_string()),
        }
    }
}
