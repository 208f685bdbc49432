//! xfer-s3: S3 backend for xfer
//!
//! Implements the [`xfer_core::ObjectStore`] trait on top of aws-sdk-s3,
//! for AWS S3 and S3-compatible servers such as MinIO or RustFS.

pub mod client;

pub use client::S3Client;
