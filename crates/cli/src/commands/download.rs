//! download command - Download an object to a local file
//!
//! The file is written atomically; on failure nothing is left at the
//! destination.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use xfer_core::TransferCoordinator;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, format_size};

/// Download an object to a local file
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Object key
    pub key: String,

    /// Destination path (default: the key's file name in the current directory)
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DownloadOutput {
    key: String,
    path: String,
    bytes: u64,
}

/// Execute the download command
pub async fn execute(
    args: DownloadArgs,
    coordinator: &TransferCoordinator,
    formatter: &Formatter,
) -> ExitCode {
    let destination = match args.destination.clone().or_else(|| default_destination(&args.key)) {
        Some(path) => path,
        None => {
            formatter.error(&format!(
                "Cannot derive a file name from key '{}'; pass a destination",
                args.key
            ));
            return ExitCode::UsageError;
        }
    };

    let spinner = formatter.spinner(format!("Downloading {}", args.key));
    let result = coordinator.download(&args.key, &destination).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(bytes) => {
            if formatter.is_json() {
                formatter.json(&DownloadOutput {
                    key: args.key,
                    path: destination.display().to_string(),
                    bytes,
                });
            } else {
                let key = formatter.style_key(&args.key);
                let path = formatter.style_path(&destination.display().to_string());
                let size = formatter.style_size(&format_size(bytes));
                formatter.success(&format!("Downloaded {key} to {path} ({size})"));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to download {}: {e}", args.key));
            ExitCode::from_error(&e)
        }
    }
}

/// Last segment of the key, if it has one
fn default_destination(key: &str) -> Option<PathBuf> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(PathBuf::from)
}
