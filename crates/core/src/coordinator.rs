//! Transfer coordinator
//!
//! Entry point for the four user-facing operations. Each call walks
//! `Idle -> EnsuringContainer -> {Uploading | Downloading | Listing} -> Done`;
//! listing only checks that the container exists and never creates it.
//! No state survives between calls apart from the cancellation token.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::{DEFAULT_TIMEOUT, ObjectStoreClient};
use crate::error::{Error, Result};
use crate::key::{default_key, normalize_prefix, validate_key};
use crate::retry::RetryPolicy;
use crate::traits::{ObjectDescriptor, ObjectStore, PutOptions};
use crate::transfer::{
    TransferOutcome, TransferRequest, TransferResult, TransferSummary, log_failure,
};
use crate::uploader::DirectoryUploader;

/// Immutable settings for a [`TransferCoordinator`]
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Prefix used when a caller does not pass one
    pub default_prefix: String,
    /// Parallel uploads used when a caller does not pass a value
    pub concurrency: usize,
    /// Limit for each individual store call
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            default_prefix: String::new(),
            concurrency: 1,
            request_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Where a coordinator call currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    EnsuringContainer,
    Uploading,
    Downloading,
    Listing,
    Done,
}

/// Sequences container checks and transfers for one store
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    client: ObjectStoreClient,
    uploader: DirectoryUploader,
    config: TransferConfig,
    cancel: CancellationToken,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, config: TransferConfig) -> Self {
        let client = ObjectStoreClient::new(store, config.retry.clone(), config.request_timeout);
        Self {
            uploader: DirectoryUploader::new(client.clone()),
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn client(&self) -> &ObjectStoreClient {
        &self.client
    }

    /// Upload a single file.
    ///
    /// Without `key`, the file name under the default prefix is used. The
    /// local file is checked before any network call is made.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        key: Option<&str>,
    ) -> Result<ObjectDescriptor> {
        let operation = "upload_file";
        started(operation, local_path);

        let result = async {
            let metadata = tokio::fs::metadata(local_path)
                .await
                .map_err(|e| local_error(local_path, e))?;
            if !metadata.is_file() {
                return Err(Error::InvalidPath(format!(
                    "{} is not a regular file",
                    local_path.display()
                )));
            }

            let key = match key {
                Some(key) => {
                    validate_key(key)?;
                    key.to_string()
                }
                None => default_key(local_path, &self.config.default_prefix)?,
            };

            self.ensure_container(operation).await?;

            transition(operation, Phase::Uploading);
            let data = tokio::fs::read(local_path)
                .await
                .map_err(|e| local_error(local_path, e))?;
            let size = data.len() as u64;
            let request = TransferRequest::upload(local_path, key.as_str());
            let outcome = self
                .client
                .put_object(&key, data.into(), PutOptions::guess_from_key(&key))
                .await;

            match outcome.result {
                Ok(descriptor) => {
                    TransferResult::success(request, size, outcome.attempts).log();
                    Ok(descriptor)
                }
                Err(e) => {
                    log_failure(&request, TransferOutcome::Failure, &e, outcome.attempts);
                    Err(e)
                }
            }
        }
        .await;

        finished(operation, &result);
        result
    }

    /// Upload every regular file below `root`.
    ///
    /// `prefix` and `concurrency` fall back to the configured defaults.
    /// Per-file failures are reported in the summary rather than returned.
    pub async fn upload_directory(
        &self,
        root: &Path,
        prefix: Option<&str>,
        concurrency: Option<usize>,
    ) -> Result<TransferSummary> {
        let operation = "upload_directory";
        started(operation, root);

        let result = async {
            let prefix = normalize_prefix(prefix.unwrap_or(&self.config.default_prefix))?;
            let concurrency = concurrency.unwrap_or(self.config.concurrency);
            if concurrency == 0 {
                return Err(Error::InvalidArgument(
                    "concurrency must be at least 1".into(),
                ));
            }

            tokio::fs::read_dir(root)
                .await
                .map_err(|e| Error::DirectoryAccess {
                    path: root.to_path_buf(),
                    reason: e.to_string(),
                })?;

            self.ensure_container(operation).await?;

            transition(operation, Phase::Uploading);
            self.uploader
                .upload_directory(root, &prefix, concurrency, &self.cancel)
                .await
        }
        .await;

        if let Ok(summary) = &result {
            tracing::info!(
                operation,
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                cancelled = summary.cancelled,
                bytes = summary.bytes_transferred,
                "Directory upload summary"
            );
        }
        finished(operation, &result);
        result
    }

    /// Download `key` to `local_path`, returning the number of bytes written.
    ///
    /// Content goes to a temporary file next to the target and is renamed
    /// into place only once fully written, so a failed download never leaves
    /// a partial file at `local_path`. Missing parent directories are created.
    pub async fn download(&self, key: &str, local_path: &Path) -> Result<u64> {
        let operation = "download";
        started(operation, local_path);

        let request = TransferRequest::download(key, local_path);
        let mut attempts = 0;
        let result = async {
            self.ensure_container(operation).await?;

            transition(operation, Phase::Downloading);
            let outcome = self.client.get_object(key).await;
            attempts = outcome.attempts;
            let content = outcome.result?;

            let target = local_path.to_path_buf();
            let data = content.data;
            tokio::task::spawn_blocking(move || write_atomically(&target, &data))
                .await
                .map_err(|e| Error::General(format!("download writer panicked: {e}")))??;
            Ok(content.size_bytes)
        }
        .await;

        match &result {
            Ok(size) => TransferResult::success(request, *size, attempts).log(),
            Err(e) => log_failure(&request, TransferOutcome::Failure, e, attempts),
        }
        finished(operation, &result);
        result
    }

    /// List objects under `prefix`, ascending by key.
    ///
    /// The container must already exist; it is never created here.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the container does not exist. Errors
    /// while paging are yielded by the stream.
    pub async fn list<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Result<impl Stream<Item = Result<ObjectDescriptor>> + Send + 'a> {
        let operation = "list";
        transition(operation, Phase::Idle);

        if !self.client.container_exists().await? {
            let err = Error::NotFound(format!("container '{}'", self.client.container()));
            transition(operation, Phase::Done);
            tracing::warn!(operation, error = %err, kind = err.kind(), "Operation failed");
            return Err(err);
        }

        transition(operation, Phase::Listing);
        Ok(self.client.list_objects(prefix))
    }

    /// Collect a full listing into memory
    pub async fn list_all(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>> {
        let objects: Vec<ObjectDescriptor> = self.list(prefix).await?.try_collect().await?;
        tracing::info!(operation = "list", prefix, count = objects.len(), "Operation finished");
        Ok(objects)
    }

    async fn ensure_container(&self, operation: &'static str) -> Result<()> {
        transition(operation, Phase::EnsuringContainer);
        self.client.ensure_container().await.map(|_| ())
    }
}

fn transition(operation: &'static str, phase: Phase) {
    tracing::debug!(operation, phase = ?phase, "Coordinator transition");
}

fn started(operation: &'static str, path: &Path) {
    transition(operation, Phase::Idle);
    tracing::info!(operation, path = %path.display(), "Operation started");
}

fn finished<T>(operation: &'static str, result: &Result<T>) {
    transition(operation, Phase::Done);
    match result {
        Ok(_) => tracing::info!(operation, "Operation finished"),
        Err(e) => tracing::warn!(operation, error = %e, kind = e.kind(), "Operation failed"),
    }
}

fn local_error(path: &Path, error: std::io::Error) -> Error {
    if error.kind() == std::io::ErrorKind::NotFound {
        Error::FileNotFound(path.to_path_buf())
    } else {
        Error::Io(error)
    }
}

/// Write `data` to a sibling temp file, then rename it over `target`
fn write_atomically(target: &Path, data: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, Operation};
    use tempfile::TempDir;

    fn coordinator(store: Arc<MemoryStore>) -> TransferCoordinator {
        let config = TransferConfig {
            retry: RetryPolicy::no_retry(),
            ..Default::default()
        };
        TransferCoordinator::new(store, config)
    }

    #[tokio::test]
    async fn test_upload_file_missing_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new("bucket"));

        let result = coordinator(store.clone())
            .upload_file(&dir.path().join("nope.txt"), None)
            .await;

        assert!(matches!(result, Err(Error::FileNotFound(_))));
        assert_eq!(store.call_count(Operation::ContainerExists), 0);
        assert_eq!(store.call_count(Operation::Put), 0);
    }

    #[tokio::test]
    async fn test_upload_file_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new("bucket"));

        let result = coordinator(store).upload_file(dir.path(), Some("k")).await;
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_upload_file_default_key_uses_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# hi").unwrap();

        let store = Arc::new(MemoryStore::new("bucket"));
        let config = TransferConfig {
            default_prefix: "docs".into(),
            ..Default::default()
        };
        let descriptor = TransferCoordinator::new(store.clone(), config)
            .upload_file(&path, None)
            .await
            .unwrap();

        assert_eq!(descriptor.key, "docs/notes.md");
        assert_eq!(descriptor.size_bytes, 4);
        assert_eq!(store.creation_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_file_invalid_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();
        let store = Arc::new(MemoryStore::new("bucket"));

        let result = coordinator(store.clone())
            .upload_file(&path, Some("../a.txt"))
            .await;
        assert!(matches!(result, Err(Error::InvalidPath(_))));
        assert_eq!(store.call_count(Operation::ContainerExists), 0);
    }

    #[tokio::test]
    async fn test_list_missing_container() {
        let store = Arc::new(MemoryStore::new("bucket"));
        let result = coordinator(store.clone()).list_all("").await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.creation_count(), 0);
        assert_eq!(store.call_count(Operation::CreateContainer), 0);
    }

    #[tokio::test]
    async fn test_download_missing_key_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("existing.txt");
        std::fs::write(&target, "keep me").unwrap();

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let result = coordinator(store).download("missing", &target).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep me");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_download_creates_parents_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/deeper/out.bin");

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        store.insert("k", &b"first"[..]);
        let coordinator = coordinator(store.clone());

        assert_eq!(coordinator.download("k", &target).await.unwrap(), 5);
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        store.insert("k", &b"second!"[..]);
        assert_eq!(coordinator.download("k", &target).await.unwrap(), 7);
        assert_eq!(std::fs::read(&target).unwrap(), b"second!");
    }

    #[tokio::test]
    async fn test_download_retries_transient_get() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        store.insert("k", bytes::Bytes::from_static(b"hello"));
        store.inject_fault(Operation::Get, Some("k"), Some(2), || {
            Error::Network("503 Service Unavailable".into())
        });
        let config = TransferConfig {
            retry: crate::retry::RetryBuilder::new()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(1))
                .build()
                .unwrap(),
            ..Default::default()
        };
        let coordinator = TransferCoordinator::new(store.clone(), config);

        let target = dir.path().join("k");
        assert_eq!(coordinator.download("k", &target).await.unwrap(), 5);
        assert_eq!(store.call_count(Operation::Get), 3);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_upload_directory_missing_root_skips_container() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new("bucket"));

        let result = coordinator(store.clone())
            .upload_directory(&dir.path().join("absent"), None, None)
            .await;

        assert!(matches!(result, Err(Error::DirectoryAccess { .. })));
        assert_eq!(store.call_count(Operation::ContainerExists), 0);
    }

    #[tokio::test]
    async fn test_upload_directory_checks_container_once() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let store = Arc::new(MemoryStore::new("bucket"));

        let summary = coordinator(store.clone())
            .upload_directory(dir.path(), Some("x"), Some(2))
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 3);
        assert_eq!(store.call_count(Operation::ContainerExists), 1);
        assert_eq!(store.creation_count(), 1);
    }
}
