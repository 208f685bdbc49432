//! Recursive directory upload
//!
//! Walks a local tree in a fixed order, uploads every regular file and
//! records one [`TransferResult`] per file. A failing file never stops the
//! rest of the batch.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::client::ObjectStoreClient;
use crate::error::{Error, Result};
use crate::key::{compute_key, normalize_prefix};
use crate::traits::PutOptions;
use crate::transfer::{TransferRequest, TransferResult, TransferSummary};

/// An entry found while walking the upload root
#[derive(Debug)]
pub enum Discovered {
    /// A regular file to upload
    File(PathBuf),
    /// A path below the root that could not be read
    Unreadable { path: PathBuf, reason: String },
}

impl Discovered {
    pub fn path(&self) -> &Path {
        match self {
            Discovered::File(path) => path.as_path(),
            Discovered::Unreadable { path, .. } => path.as_path(),
        }
    }
}

/// Enumerate regular files below `root`.
///
/// Entries are visited depth-first with siblings sorted by file name, so
/// files and directories interleave by name. Symlinks, devices and other
/// non-regular entries are skipped.
///
/// # Errors
/// Returns [`Error::DirectoryAccess`] if `root` itself cannot be read.
pub fn discover_files(root: &Path) -> Result<Vec<Discovered>> {
    std::fs::read_dir(root).map_err(|e| Error::DirectoryAccess {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                found.push(Discovered::File(entry.into_path()));
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                found.push(Discovered::Unreadable {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(found)
}

/// Uploads directory trees through an [`ObjectStoreClient`]
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    client: ObjectStoreClient,
}

impl DirectoryUploader {
    pub fn new(client: ObjectStoreClient) -> Self {
        Self { client }
    }

    /// Upload every regular file under `root`, keyed below `prefix`.
    ///
    /// At most `concurrency` uploads run at once. Results come back in
    /// discovery order regardless of completion order. Once `cancel` fires,
    /// remaining files are reported as cancelled without being uploaded.
    ///
    /// # Errors
    /// Fails before producing any result if `root` cannot be read, if
    /// `prefix` has a relative segment or if `concurrency` is zero.
    /// Per-file failures are reported in the summary.
    pub async fn upload_directory(
        &self,
        root: &Path,
        prefix: &str,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<TransferSummary> {
        if concurrency == 0 {
            return Err(Error::InvalidArgument(
                "concurrency must be at least 1".into(),
            ));
        }

        let prefix = normalize_prefix(prefix)?;
        let prefix = prefix.as_str();

        let walk_root = root.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || discover_files(&walk_root))
            .await
            .map_err(|e| Error::General(format!("directory walk panicked: {e}")))??;

        tracing::info!(
            root = %root.display(),
            files = entries.len(),
            concurrency,
            "Uploading directory"
        );

        let results: Vec<TransferResult> = stream::iter(entries)
            .map(|entry| async move {
                let result = self.transfer(root, prefix, entry, cancel).await;
                result.log();
                result
            })
            .buffered(concurrency)
            .collect()
            .await;

        Ok(TransferSummary::from_results(results))
    }

    async fn transfer(
        &self,
        root: &Path,
        prefix: &str,
        entry: Discovered,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let key = compute_key(root, entry.path(), prefix);

        let path = match entry {
            Discovered::File(path) => path,
            Discovered::Unreadable { path, reason } => {
                let request = TransferRequest::upload(path.clone(), key.unwrap_or_default());
                return TransferResult::failure(
                    request,
                    Error::DirectoryAccess { path, reason },
                    0,
                );
            }
        };

        let key = match key {
            Ok(key) => key,
            Err(e) => return TransferResult::failure(TransferRequest::upload(path, ""), e, 0),
        };
        let request = TransferRequest::upload(path, key);

        if cancel.is_cancelled() {
            return TransferResult::cancelled(request);
        }

        let data = match tokio::fs::read(&request.local_path).await {
            Ok(data) => Bytes::from(data),
            Err(e) => return TransferResult::failure(request, Error::Io(e), 0),
        };
        let size = data.len() as u64;

        if cancel.is_cancelled() {
            return TransferResult::cancelled(request);
        }

        let options = PutOptions::guess_from_key(&request.remote_key);
        let outcome = self
            .client
            .put_object(&request.remote_key, data, options)
            .await;

        match outcome.result {
            Ok(_) => TransferResult::success(request, size, outcome.attempts),
            Err(e) => TransferResult::failure(request, e, outcome.attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, Operation};
    use crate::retry::RetryPolicy;
    use crate::traits::{ListPage, ObjectContent, ObjectDescriptor, ObjectStore};
    use crate::transfer::TransferOutcome;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn uploader_for(store: Arc<dyn ObjectStore>) -> DirectoryUploader {
        DirectoryUploader::new(ObjectStoreClient::new(
            store,
            RetryPolicy::no_retry(),
            Duration::from_secs(5),
        ))
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn keys(summary: &TransferSummary) -> Vec<&str> {
        summary
            .results
            .iter()
            .map(|r| r.request.remote_key.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_upload_tree_in_name_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.txt", "b");
        write(dir.path(), "a/2.txt", "22");
        write(dir.path(), "a/1.txt", "1");
        write(dir.path(), "c/d/e.txt", "eee");

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "2024", 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            keys(&summary),
            vec!["2024/a/1.txt", "2024/a/2.txt", "2024/b.txt", "2024/c/d/e.txt"]
        );
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.bytes_transferred, 7);
        assert_eq!(&store.object("2024/c/d/e.txt").unwrap()[..], b"eee");
        assert_eq!(
            store.content_type("2024/b.txt").as_deref(),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        for name in ["1", "2", "3", "4", "5"] {
            write(dir.path(), &format!("{name}.bin"), name);
        }

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        store.inject_fault(Operation::Put, Some("3.bin"), None, || {
            Error::Auth("AccessDenied".into())
        });

        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "", 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        let failed = &summary.results[2];
        assert_eq!(failed.request.remote_key, "3.bin");
        assert_eq!(failed.outcome, TransferOutcome::Failure);
        assert!(matches!(failed.error, Some(Error::Auth(_))));
        assert_eq!(failed.attempts, 1);
        assert_eq!(store.keys(), vec!["1.bin", "2.bin", "4.bin", "5.bin"]);
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_discovery_order() {
        let dir = TempDir::new().unwrap();
        for i in 0..12 {
            write(dir.path(), &format!("f{i:02}.txt"), "x");
        }

        let store = Arc::new(
            MemoryStore::with_existing_container("bucket").with_latency(Duration::from_millis(5)),
        );
        let summary = uploader_for(store)
            .upload_directory(dir.path(), "p", 4, &CancellationToken::new())
            .await
            .unwrap();

        let expected: Vec<String> = (0..12).map(|i| format!("p/f{i:02}.txt")).collect();
        assert_eq!(keys(&summary), expected);
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_missing_root_fails_fast() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::with_existing_container("bucket"));

        let result = uploader_for(store.clone())
            .upload_directory(
                &dir.path().join("missing"),
                "",
                1,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::DirectoryAccess { .. })));
        assert_eq!(store.call_count(Operation::Put), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let result = uploader_for(store)
            .upload_directory(dir.path(), "", 0, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let store = Arc::new(MemoryStore::with_existing_container("bucket"));

        let summary = uploader_for(store)
            .upload_directory(dir.path(), "", 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "real.txt", "data");
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let summary = uploader_for(store)
            .upload_directory(dir.path(), "", 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(keys(&summary), vec!["real.txt"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b.txt", "b");

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "", 1, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.failed, 2);
        assert!(
            summary
                .results
                .iter()
                .all(|r| matches!(r.error, Some(Error::Cancelled(_))))
        );
        assert!(store.keys().is_empty());
    }

    /// Cancels the token once the first upload completes
    struct CancelAfterFirstPut {
        inner: MemoryStore,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl ObjectStore for CancelAfterFirstPut {
        fn container(&self) -> String {
            self.inner.container()
        }

        async fn container_exists(&self) -> Result<bool> {
            self.inner.container_exists().await
        }

        async fn create_container(&self) -> Result<()> {
            self.inner.create_container().await
        }

        async fn put_object(
            &self,
            key: &str,
            data: Bytes,
            options: PutOptions,
        ) -> Result<ObjectDescriptor> {
            let result = self.inner.put_object(key, data, options).await;
            self.cancel.cancel();
            result
        }

        async fn get_object(&self, key: &str) -> Result<ObjectContent> {
            self.inner.get_object(key).await
        }

        async fn list_page(
            &self,
            prefix: &str,
            continuation_token: Option<String>,
        ) -> Result<ListPage> {
            self.inner.list_page(prefix, continuation_token).await
        }
    }

    #[tokio::test]
    async fn test_cancel_midway_reports_undispatched() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            write(dir.path(), &format!("{name}.txt"), name);
        }

        let cancel = CancellationToken::new();
        let store = Arc::new(CancelAfterFirstPut {
            inner: MemoryStore::with_existing_container("bucket"),
            cancel: cancel.clone(),
        });

        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "", 1, &cancel)
            .await
            .unwrap();

        let outcomes: Vec<TransferOutcome> = summary.results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                TransferOutcome::Success,
                TransferOutcome::Cancelled,
                TransferOutcome::Cancelled
            ]
        );
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(store.inner.keys(), vec!["a.txt"]);
    }

    /// Holds every upload until `parties` of them are in flight, then cancels
    struct CancelWhileInFlight {
        inner: MemoryStore,
        barrier: tokio::sync::Barrier,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl ObjectStore for CancelWhileInFlight {
        fn container(&self) -> String {
            self.inner.container()
        }

        async fn container_exists(&self) -> Result<bool> {
            self.inner.container_exists().await
        }

        async fn create_container(&self) -> Result<()> {
            self.inner.create_container().await
        }

        async fn put_object(
            &self,
            key: &str,
            data: Bytes,
            options: PutOptions,
        ) -> Result<ObjectDescriptor> {
            self.barrier.wait().await;
            self.cancel.cancel();
            self.inner.put_object(key, data, options).await
        }

        async fn get_object(&self, key: &str) -> Result<ObjectContent> {
            self.inner.get_object(key).await
        }

        async fn list_page(
            &self,
            prefix: &str,
            continuation_token: Option<String>,
        ) -> Result<ListPage> {
            self.inner.list_page(prefix, continuation_token).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_cancel_lets_in_flight_finish() {
        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            write(dir.path(), &format!("{name}.txt"), name);
        }

        let cancel = CancellationToken::new();
        let store = Arc::new(CancelWhileInFlight {
            inner: MemoryStore::with_existing_container("bucket"),
            barrier: tokio::sync::Barrier::new(2),
            cancel: cancel.clone(),
        });

        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "", 2, &cancel)
            .await
            .unwrap();

        let outcomes: Vec<TransferOutcome> = summary.results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                TransferOutcome::Success,
                TransferOutcome::Success,
                TransferOutcome::Cancelled,
                TransferOutcome::Cancelled,
                TransferOutcome::Cancelled
            ]
        );
        assert_eq!(summary.total, 5);
        assert_eq!(summary.cancelled, 3);
        assert_eq!(store.inner.keys(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_failed_result() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let uploader = uploader_for(store.clone());
        let entry = Discovered::Unreadable {
            path: dir.path().join("locked"),
            reason: "permission denied".into(),
        };

        let result = uploader
            .transfer(dir.path(), "p", entry, &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, TransferOutcome::Failure);
        assert_eq!(result.request.remote_key, "p/locked");
        assert_eq!(result.attempts, 0);
        assert!(matches!(
            result.error,
            Some(Error::DirectoryAccess { ref reason, .. }) if reason == "permission denied"
        ));
        assert_eq!(store.call_count(Operation::Put), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subdirectory_does_not_stop_batch() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "locked/hidden.txt", "h");
        write(dir.path(), "z.txt", "z");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits are not enforced for this user (e.g. root)
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "", 1, &CancellationToken::new())
            .await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let summary = summary.unwrap();

        assert_eq!(keys(&summary), vec!["a.txt", "locked", "z.txt"]);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            summary.results[1].error,
            Some(Error::DirectoryAccess { .. })
        ));
        assert_eq!(store.keys(), vec!["a.txt", "z.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backslash_names_keep_distinct_keys() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b.txt", "nested");
        write(dir.path(), "a\\b.txt", "flat");

        let store = Arc::new(MemoryStore::with_existing_container("bucket"));
        let summary = uploader_for(store.clone())
            .upload_directory(dir.path(), "", 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(store.keys(), vec!["a/b.txt", "a\\b.txt"]);
        assert_eq!(&store.object("a/b.txt").unwrap()[..], b"nested");
        assert_eq!(&store.object("a\\b.txt").unwrap()[..], b"flat");
    }

    #[test]
    fn test_discover_files_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "z.txt", "");
        write(dir.path(), "m/inner.txt", "");
        write(dir.path(), "a.txt", "");

        let found = discover_files(dir.path()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|d| {
                d.path()
                    .strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "m/inner.txt", "z.txt"]);
    }

    #[test]
    fn test_discover_files_on_regular_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plain.txt", "x");
        assert!(matches!(
            discover_files(&dir.path().join("plain.txt")),
            Err(Error::DirectoryAccess { .. })
        ));
    }
}
