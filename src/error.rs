//! Engine Error Types
//!
//! Caller-visible failures of the engine and its stores. Per-step faults never
//! appear here: those become failed step outcomes and are recorded in the
//! execution history instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::execution::record::ExecutionStatus;

/// Errors surfaced by the engine, the repositories and configuration loading.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Execution '{execution_id}' is {status}, not paused")]
    NotPaused {
        execution_id: String,
        status: ExecutionStatus,
    },

    #[error("Execution already exists: {0}")]
    DuplicateExecution(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Paused execution '{0}' has no current step")]
    MissingCursor(String),

    #[error("Execution '{execution_id}' expected to be {expected} but is {actual}")]
    StaleTransition {
        execution_id: String,
        expected: ExecutionStatus,
        actual: ExecutionStatus,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_paused_message() {
        let err = EngineError::NotPaused {
            execution_id: "e1".to_string(),
            status: ExecutionStatus::Succeeded,
        };
        assert_eq!(err.to_string(), "Execution 'e1' is succeeded, not paused");
    }

    #[test]
    fn test_stale_transition_message() {
        let err = EngineError::StaleTransition {
            execution_id: "e1".to_string(),
            expected: ExecutionStatus::Paused,
            actual: ExecutionStatus::Running,
        };
        assert!(err.to_string().contains("expected to be paused but is running"));
    }

    #[test]
    fn test_io_error_includes_path() {
        let err = EngineError::io(
            "/tmp/missing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.json"));
    }
}
