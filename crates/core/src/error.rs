//! Error types for xfer-core
//!
//! One error enum covers local filesystem failures, key computation,
//! remote store failures and the retry/cancellation wrappers around them.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for xfer-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the transfer engine
#[derive(Debug, Error)]
pub enum Error {
    /// Key computation rejected an empty or out-of-root path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Local file to upload does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Local directory is missing or unreadable
    #[error("Cannot read directory {}: {reason}", .path.display())]
    DirectoryAccess { path: PathBuf, reason: String },

    /// Remote key or container is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected or access denied
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request rejected by the store as malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network or server-side failure
    #[error("Network error: {0}")]
    Network(String),

    /// A store call did not complete within the configured timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Transient failures persisted through every allowed attempt
    #[error("Gave up after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Work was not dispatched because cancellation was requested
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else
    #[error("{0}")]
    General(String),
}

/// Whether an error is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Permanent,
}

impl Error {
    /// Classify this error for the retry executor
    pub fn classify(&self) -> Classification {
        match self {
            Error::Network(_) | Error::Timeout(_) => Classification::Transient,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted => Classification::Transient,
                _ => Classification::Permanent,
            },
            _ => Classification::Permanent,
        }
    }

    /// True if the error is classified transient
    pub fn is_transient(&self) -> bool {
        self.classify() == Classification::Transient
    }

    /// The innermost error, looking through `RetryExhausted`
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::RetryExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Short machine-readable name used in logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidPath(_) => "invalid_path",
            Error::FileNotFound(_) => "file_not_found",
            Error::DirectoryAccess { .. } => "directory_access",
            Error::NotFound(_) => "not_found",
            Error::Auth(_) => "auth",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Conflict(_) => "conflict",
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::RetryExhausted { .. } => "retry_exhausted",
            Error::Cancelled(_) => "cancelled",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::General(_) => "general",
        }
    }
}
