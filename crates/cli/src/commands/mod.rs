//! Command definitions and dispatch

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use xfer_core::{Config, ConfigManager, TransferCoordinator};
use xfer_s3::S3Client;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod download;
mod list;
mod upload_dir;
mod upload_file;

/// Upload, download and list files in S3-compatible object storage
#[derive(Parser, Debug)]
#[command(name = "xfer", version, about, long_about = None)]
pub struct Cli {
    /// Output JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, env = "XFER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection overrides applied on top of the config file and environment
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// Bucket to operate on
    #[arg(short, long, global = true)]
    pub bucket: Option<String>,

    /// S3 endpoint URL (e.g., `http://localhost:9000`)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, global = true)]
    pub path_style: bool,
}

impl StoreArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(bucket) = &self.bucket {
            config.store.bucket = bucket.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.store.endpoint = Some(endpoint.clone());
        }
        if let Some(region) = &self.region {
            config.store.region = region.clone();
        }
        if self.path_style {
            config.store.path_style = true;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a single file
    UploadFile(upload_file::UploadFileArgs),

    /// Upload every file under a directory
    UploadDir(upload_dir::UploadDirArgs),

    /// List objects under a prefix
    List(list::ListArgs),

    /// Download an object to a local file
    Download(download::DownloadArgs),
}

/// Execute the parsed command line
pub async fn execute(cli: Cli, cancel: CancellationToken) -> ExitCode {
    let formatter = Formatter::new(OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    });

    let coordinator = match build_coordinator(&cli, cancel.clone()).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return e
                .downcast_ref::<xfer_core::Error>()
                .map(ExitCode::from_error)
                .unwrap_or(ExitCode::GeneralError);
        }
    };

    let code = run(cli.command, &coordinator, &formatter).await;
    if cancel.is_cancelled() && code != ExitCode::Success {
        ExitCode::Interrupted
    } else {
        code
    }
}

async fn run(
    command: Commands,
    coordinator: &TransferCoordinator,
    formatter: &Formatter,
) -> ExitCode {
    match command {
        Commands::UploadFile(args) => upload_file::execute(args, coordinator, formatter).await,
        Commands::UploadDir(args) => upload_dir::execute(args, coordinator, formatter).await,
        Commands::List(args) => list::execute(args, coordinator, formatter).await,
        Commands::Download(args) => download::execute(args, coordinator, formatter).await,
    }
}

/// Load configuration, apply overrides and connect to the store
async fn build_coordinator(
    cli: &Cli,
    cancel: CancellationToken,
) -> anyhow::Result<TransferCoordinator> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };

    let mut config = manager
        .load_with_env()
        .with_context(|| format!("loading {}", manager.config_path().display()))?;
    cli.store.apply(&mut config);

    let transfer = config.transfer_config()?;
    let store = S3Client::new(&config.store)
        .await
        .context("connecting to object store")?;

    Ok(TransferCoordinator::new(Arc::new(store), transfer).with_cancellation(cancel))
}
