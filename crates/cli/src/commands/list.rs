//! list command - List objects under a prefix
//!
//! Pages are fetched lazily from the store; the output is rendered once the
//! listing is complete.

use clap::Args;
use futures::TryStreamExt;
use serde::Serialize;
use xfer_core::{ObjectDescriptor, TransferCoordinator};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, format_size};

/// List objects under a prefix
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Key prefix to filter by (default: everything)
    #[arg(default_value = "")]
    pub prefix: String,

    /// Stop after this many objects
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    prefix: &'a str,
    count: usize,
    total_bytes: u64,
    objects: &'a [ObjectDescriptor],
}

/// Execute the list command
pub async fn execute(
    args: ListArgs,
    coordinator: &TransferCoordinator,
    formatter: &Formatter,
) -> ExitCode {
    let objects = match collect(&args, coordinator).await {
        Ok(objects) => objects,
        Err(e) => {
            formatter.error(&format!("Failed to list '{}': {e}", args.prefix));
            return ExitCode::from_error(&e);
        }
    };
    let total_bytes: u64 = objects.iter().map(|o| o.size_bytes).sum();

    if formatter.is_json() {
        formatter.json(&ListOutput {
            prefix: &args.prefix,
            count: objects.len(),
            total_bytes,
            objects: &objects,
        });
        return ExitCode::Success;
    }

    if objects.is_empty() {
        formatter.println("No objects found.");
        return ExitCode::Success;
    }

    let mut table = formatter.table();
    table.set_header(vec!["Key", "Size", "Last modified"]);
    for object in &objects {
        table.add_row(vec![
            object.key.clone(),
            format_size(object.size_bytes),
            object.last_modified.strftime("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    formatter.println(&table.to_string());
    formatter.println(&format!(
        "{} object(s), {}",
        objects.len(),
        formatter.style_size(&format_size(total_bytes))
    ));

    ExitCode::Success
}

async fn collect(
    args: &ListArgs,
    coordinator: &TransferCoordinator,
) -> xfer_core::Result<Vec<ObjectDescriptor>> {
    let stream = coordinator.list(&args.prefix).await?;

    match args.limit {
        Some(limit) => {
            let mut stream = std::pin::pin!(stream);
            let mut objects = Vec::with_capacity(limit.min(1000));
            while objects.len() < limit {
                match stream.try_next().await? {
                    Some(object) => objects.push(object),
                    None => break,
                }
            }
            Ok(objects)
        }
        None => stream.try_collect().await,
    }
}
