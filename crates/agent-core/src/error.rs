//! Error types for agent-core

use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the pipeline data model and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// The run request is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The agent pipeline failed while producing chunks
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A collaborator (summarizer, signal extractor, run record) failed
    #[error("{name} failed: {message}")]
    Collaborator { name: String, message: String },

    /// The artifact store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a collaborator failure
    pub fn collaborator(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidRequest("Analysts must be a non-empty list".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid request: Analysts must be a non-empty list"
        );

        let err = Error::collaborator("summarizer market", "timeout");
        assert_eq!(err.to_string(), "summarizer market failed: timeout");
    }

    #[test]
    fn test_json_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
