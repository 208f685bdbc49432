//! xfer - object storage transfer tool
//!
//! Uploads files and directory trees to an S3-compatible bucket, downloads
//! objects and lists keys under a prefix.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod exit_code;
mod output;

use commands::Cli;
use exit_code::ExitCode;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e:#}");
        std::process::exit(ExitCode::GeneralError.as_i32());
    }

    let cancel = setup_signal_handler();
    let exit_code = commands::execute(cli, cancel).await;

    std::process::exit(exit_code.as_i32());
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`), and optionally
/// to a file without ANSI colors.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

/// Cancel outstanding transfers on Ctrl-C
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Finishing in-flight transfers...");
                token.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Could not install Ctrl-C handler"),
        }
    });

    cancel
}
