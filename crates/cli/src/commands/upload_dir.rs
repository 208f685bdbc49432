//! upload-dir command - Upload a directory tree
//!
//! Every regular file below the directory becomes one object whose key is
//! its relative path under the prefix. Failures of individual files are
//! listed but do not stop the batch.

use std::path::PathBuf;

use clap::Args;
use xfer_core::{TransferCoordinator, TransferOutcome, TransferSummaryReport};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, format_size};

/// Upload every file under a directory
#[derive(Args, Debug)]
pub struct UploadDirArgs {
    /// Local directory to upload
    pub directory: PathBuf,

    /// Key prefix (default: the configured prefix)
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Number of parallel uploads (default: the configured concurrency)
    #[arg(short = 'P', long)]
    pub concurrency: Option<usize>,
}

/// Execute the upload-dir command
pub async fn execute(
    args: UploadDirArgs,
    coordinator: &TransferCoordinator,
    formatter: &Formatter,
) -> ExitCode {
    let spinner = formatter.spinner(format!("Uploading {}", args.directory.display()));
    let result = coordinator
        .upload_directory(&args.directory, args.prefix.as_deref(), args.concurrency)
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            formatter.error(&format!(
                "Failed to upload {}: {e}",
                args.directory.display()
            ));
            return ExitCode::from_error(&e);
        }
    };

    if formatter.is_json() {
        formatter.json(&TransferSummaryReport::from(&summary));
    } else {
        for result in summary.failures() {
            let reason = result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            let path = result.request.local_path.display().to_string();
            match result.outcome {
                TransferOutcome::Cancelled => {
                    formatter.warning(&format!("Skipped {path}: {reason}"))
                }
                _ => formatter.error(&format!(
                    "{} -> {}: {reason}",
                    formatter.style_path(&path),
                    formatter.style_key(&result.request.remote_key)
                )),
            }
        }

        let line = format!(
            "{} succeeded, {} failed, {} bytes total ({})",
            summary.succeeded,
            summary.failed,
            summary.bytes_transferred,
            formatter.style_size(&format_size(summary.bytes_transferred))
        );
        if summary.is_success() {
            formatter.success(&line);
        } else {
            formatter.println(&line);
        }
    }

    if summary.is_success() {
        ExitCode::Success
    } else {
        ExitCode::GeneralError
    }
}
