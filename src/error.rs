//! Failure kinds surfaced by connection resolution, command execution and
//! session recovery.

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ManagerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cluster `{0}` not found")]
    NotFound(String),

    #[error("stored login command for `{0}` has no `login` verb")]
    MalformedLoginCommand(String),

    #[error("failed to run `{program}`: {message}")]
    ConnectionFailure { program: String, message: String },

    #[error("{0}")]
    CommandExecution(String),

    #[error("command timed out after {0} seconds")]
    Timeout(u64),

    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("timed out waiting for authentication for `{0}`")]
    AuthenticationTimeout(String),

    #[error("source index {index} is out of range ({count} sources)")]
    InvalidSourceIndex { index: usize, count: usize },

    #[error("aborted: {0}")]
    UserAborted(String),

    #[error("interrupted")]
    Interrupted,
}
