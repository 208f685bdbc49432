//! Transfer requests, per-file results and batch summaries

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Error;

/// Direction of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// One file to move between the local filesystem and the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub direction: Direction,
}

impl TransferRequest {
    pub fn upload(local_path: impl Into<PathBuf>, remote_key: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_key: remote_key.into(),
            direction: Direction::Upload,
        }
    }

    pub fn download(remote_key: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_key: remote_key.into(),
            direction: Direction::Download,
        }
    }
}

/// How a transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOutcome {
    Success,
    Failure,
    /// Never dispatched because cancellation was requested first
    Cancelled,
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOutcome::Success => write!(f, "success"),
            TransferOutcome::Failure => write!(f, "failure"),
            TransferOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one transfer
#[derive(Debug)]
pub struct TransferResult {
    pub request: TransferRequest,
    pub outcome: TransferOutcome,
    pub bytes_transferred: u64,
    pub error: Option<Error>,
    pub attempts: u32,
}

impl TransferResult {
    pub fn success(request: TransferRequest, bytes_transferred: u64, attempts: u32) -> Self {
        Self {
            request,
            outcome: TransferOutcome::Success,
            bytes_transferred,
            error: None,
            attempts,
        }
    }

    pub fn failure(request: TransferRequest, error: Error, attempts: u32) -> Self {
        Self {
            request,
            outcome: TransferOutcome::Failure,
            bytes_transferred: 0,
            error: Some(error),
            attempts,
        }
    }

    pub fn cancelled(request: TransferRequest) -> Self {
        let reason = format!("{} was not dispatched", request.local_path.display());
        Self {
            request,
            outcome: TransferOutcome::Cancelled,
            bytes_transferred: 0,
            error: Some(Error::Cancelled(reason)),
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TransferOutcome::Success
    }

    /// Emit the structured per-result log event
    pub(crate) fn log(&self) {
        match &self.error {
            None => tracing::info!(
                key = %self.request.remote_key,
                outcome = %self.outcome,
                attempts = self.attempts,
                bytes = self.bytes_transferred,
                "Transfer finished"
            ),
            Some(error) => log_failure(&self.request, self.outcome, error, self.attempts),
        }
    }
}

/// Emit the per-result event for a transfer that did not succeed
pub(crate) fn log_failure(
    request: &TransferRequest,
    outcome: TransferOutcome,
    error: &Error,
    attempts: u32,
) {
    tracing::warn!(
        key = %request.remote_key,
        outcome = %outcome,
        attempts,
        bytes = 0u64,
        error = %error,
        "Transfer failed"
    );
}

/// Aggregate of a batch of transfers, in discovery order
#[derive(Debug, Default)]
pub struct TransferSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Failed or cancelled
    pub failed: usize,
    /// Subset of `failed` that was never dispatched
    pub cancelled: usize,
    pub bytes_transferred: u64,
    pub results: Vec<TransferResult>,
}

impl TransferSummary {
    pub fn from_results(results: Vec<TransferResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let cancelled = results
            .iter()
            .filter(|r| r.outcome == TransferOutcome::Cancelled)
            .count();
        let bytes_transferred = results.iter().map(|r| r.bytes_transferred).sum();

        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            cancelled,
            bytes_transferred,
            results,
        }
    }

    /// True when nothing failed or was cancelled
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransferResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Serializable view of a [`TransferResult`]
#[derive(Debug, Serialize)]
pub struct TransferResultReport {
    pub local_path: String,
    pub key: String,
    pub outcome: TransferOutcome,
    pub bytes: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TransferResult> for TransferResultReport {
    fn from(result: &TransferResult) -> Self {
        Self {
            local_path: result.request.local_path.display().to_string(),
            key: result.request.remote_key.clone(),
            outcome: result.outcome,
            bytes: result.bytes_transferred,
            attempts: result.attempts,
            error: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Serializable view of a [`TransferSummary`]
#[derive(Debug, Serialize)]
pub struct TransferSummaryReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes_transferred: u64,
    pub results: Vec<TransferResultReport>,
}

impl From<&TransferSummary> for TransferSummaryReport {
    fn from(summary: &TransferSummary) -> Self {
        Self {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
            bytes_transferred: summary.bytes_transferred,
            results: summary.results.iter().map(Into::into).collect(),
        }
    }
}
