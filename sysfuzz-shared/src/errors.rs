//! Error types used across the sysfuzz workspace.

use thiserror::Error;

/// Result type for sysfuzz operations.
pub type SysfuzzResult<T> = Result<T, SysfuzzError>;

#[derive(Debug, Error)]
pub enum SysfuzzError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown parameter {0:?}")]
    UnknownParam(String),

    #[error("parameter {name:?} expects a {expected} value, got {got:?}")]
    ParamType {
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("unknown syscall {0:?}")]
    UnknownSyscall(String),

    #[error("unknown syscall group {0:?}")]
    UnknownGroup(String),

    #[error("resource manager invariant violated: {0}")]
    Resource(String),

    #[error("failed to build fuzzing hierarchy at {path}: {source}")]
    Hierarchy {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read entropy from {0}: {1}")]
    Entropy(String, std::io::Error),

    #[error("child process exited unexpectedly: {0}")]
    Child(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SysfuzzError {
    fn from(err: std::io::Error) -> Self {
        SysfuzzError::Internal(format!("I/O error: {}", err))
    }
}

impl From<String> for SysfuzzError {
    fn from(err: String) -> Self {
        SysfuzzError::Internal(err)
    }
}

impl From<&str> for SysfuzzError {
    fn from(err: &str) -> Self {
        SysfuzzError::Internal(err.to_string())
    }
}
