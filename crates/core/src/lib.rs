//! xfer-core: Core library for the xfer object storage transfer tool
//!
//! This crate provides the transfer engine behind the xfer CLI, including:
//! - Key naming for local files
//! - Bounded retry with exponential backoff
//! - ObjectStore trait and the retrying client built on it
//! - Concurrent directory uploads with ordered results
//! - The coordinator that sequences container checks and transfers
//! - Configuration management
//!
//! This crate does not depend on any storage SDK. Backends implement
//! [`ObjectStore`]; [`MemoryStore`] is an in-process backend for tests.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod memory;
pub mod retry;
pub mod traits;
pub mod transfer;
pub mod uploader;

pub use client::{DEFAULT_TIMEOUT, ObjectStoreClient};
pub use config::{Config, ConfigManager, RetrySettings, StoreSettings, TransferSettings};
pub use coordinator::{Phase, TransferConfig, TransferCoordinator};
pub use error::{Classification, Error, Result};
pub use key::{compute_key, default_key, normalize_prefix, validate_key};
pub use memory::{MemoryStore, Operation};
pub use retry::{Attempted, RetryBuilder, RetryExecutor, RetryPolicy, classify_error};
pub use traits::{ListPage, ObjectContent, ObjectDescriptor, ObjectStore, PutOptions};
pub use transfer::{
    Direction, TransferOutcome, TransferRequest, TransferResult, TransferResultReport,
    TransferSummary, TransferSummaryReport,
};
pub use uploader::{DirectoryUploader, Discovered, discover_files};
