//! ObjectStore trait definition
//!
//! The transport capability the transfer engine depends on. Implementations
//! own request signing, endpoints and authentication; the engine only sees
//! containers and keys. Each store instance is bound to one container.

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::Serialize;

use crate::error::Result;

/// Metadata snapshot of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDescriptor {
    /// Full object key
    pub key: String,

    /// Size in bytes
    pub size_bytes: u64,

    /// Last modification time reported by the store
    pub last_modified: Timestamp,

    /// Opaque version marker, informational only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size_bytes: u64, last_modified: Timestamp) -> Self {
        Self {
            key: key.into(),
            size_bytes,
            last_modified,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Full content of a downloaded object
#[derive(Debug, Clone)]
pub struct ObjectContent {
    pub data: Bytes,
    pub size_bytes: u64,
}

impl ObjectContent {
    pub fn new(data: Bytes) -> Self {
        let size_bytes = data.len() as u64;
        Self { data, size_bytes }
    }
}

/// Options for uploads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// MIME type stored with the object
    pub content_type: Option<String>,
}

impl PutOptions {
    /// Options with a content type guessed from the key's extension
    pub fn guess_from_key(key: &str) -> Self {
        Self {
            content_type: mime_guess::from_path(key)
                .first()
                .map(|mime| mime.essence_str().to_string()),
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page, ascending by key
    pub items: Vec<ObjectDescriptor>,

    /// Token for the next page; `None` on the last page
    pub continuation_token: Option<String>,
}

/// Transport operations against a single container
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container this store is bound to
    fn container(&self) -> String;

    /// Check whether the container exists
    async fn container_exists(&self) -> Result<bool>;

    /// Create the container.
    ///
    /// Returns [`crate::Error::Conflict`] if it already exists.
    async fn create_container(&self) -> Result<()>;

    /// Upload an object, replacing any existing object at `key`
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<ObjectDescriptor>;

    /// Download an object's full content
    ///
    /// Returns [`crate::Error::NotFound`] if `key` does not exist.
    async fn get_object(&self, key: &str) -> Result<ObjectContent>;

    /// Fetch one page of objects whose keys start with `prefix`
    ///
    /// Returns [`crate::Error::NotFound`] if the container does not exist.
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;
}
