//! Process exit codes

use xfer_core::Error;

/// Exit status of an xfer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Everything succeeded
    Success = 0,
    /// Failure not covered below, including partially failed batches
    GeneralError = 1,
    /// Invalid arguments, paths or configuration
    UsageError = 2,
    /// Network failure, timeout or exhausted retries
    NetworkError = 3,
    /// Rejected credentials or permissions
    AuthError = 4,
    /// Missing local file, object or bucket
    NotFound = 5,
    /// Stopped by Ctrl-C
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Pick the exit code for an operation that failed with `error`
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InvalidPath(_) | Error::InvalidArgument(_) | Error::Config(_) => {
                ExitCode::UsageError
            }
            Error::FileNotFound(_) | Error::NotFound(_) => ExitCode::NotFound,
            Error::Auth(_) => ExitCode::AuthError,
            Error::Network(_) | Error::Timeout(_) | Error::RetryExhausted { .. } => {
                ExitCode::NetworkError
            }
            Error::Cancelled(_) => ExitCode::Interrupted,
            Error::DirectoryAccess { .. }
            | Error::Conflict(_)
            | Error::Io(_)
            | Error::General(_) => ExitCode::GeneralError,
        }
    }
}
