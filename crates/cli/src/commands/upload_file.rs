//! upload-file command - Upload a single local file
//!
//! The object key defaults to the file name under the configured prefix.

use std::path::PathBuf;

use clap::Args;
use xfer_core::TransferCoordinator;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, format_size};

/// Upload a single file
#[derive(Args, Debug)]
pub struct UploadFileArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Object key (default: file name under the configured prefix)
    #[arg(short, long)]
    pub key: Option<String>,
}

/// Execute the upload-file command
pub async fn execute(
    args: UploadFileArgs,
    coordinator: &TransferCoordinator,
    formatter: &Formatter,
) -> ExitCode {
    let spinner = formatter.spinner(format!("Uploading {}", args.file.display()));
    let result = coordinator
        .upload_file(&args.file, args.key.as_deref())
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(descriptor) => {
            if formatter.is_json() {
                formatter.json(&descriptor);
            } else {
                let path = formatter.style_path(&args.file.display().to_string());
                let key = formatter.style_key(&descriptor.key);
                let size = formatter.style_size(&format_size(descriptor.size_bytes));
                formatter.success(&format!("Uploaded {path} to {key} ({size})"));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to upload {}: {e}", args.file.display()));
            ExitCode::from_error(&e)
        }
    }
}
