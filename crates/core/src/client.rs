//! Object store client
//!
//! Routes every transport call through a per-call timeout and the retry
//! executor, and layers container bootstrapping and transparent paging on
//! top of the raw [`ObjectStore`] operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use bytes::Bytes;
use futures::Stream;

use crate::error::{Error, Result};
use crate::retry::{Attempted, RetryExecutor, RetryPolicy, classify_error};
use crate::traits::{ObjectContent, ObjectDescriptor, ObjectStore, PutOptions};

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retrying, time-bounded access to an [`ObjectStore`]
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    retry: RetryExecutor,
    timeout: Duration,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            store,
            retry: RetryExecutor::new(policy),
            timeout,
        }
    }

    /// Name of the underlying container
    pub fn container(&self) -> String {
        self.store.container()
    }

    /// Make sure the container exists, creating it if needed.
    ///
    /// Returns `true` if this call created it. A creation that loses a race
    /// against another writer counts as success.
    pub async fn ensure_container(&self) -> Result<bool> {
        if self.container_exists().await? {
            tracing::debug!(container = %self.container(), "Container already exists");
            return Ok(false);
        }

        let store = &self.store;
        match self
            .call("create_container", move || store.create_container())
            .await
            .into_result()
        {
            Ok(()) => {
                tracing::info!(container = %self.container(), "Created container");
                Ok(true)
            }
            Err(Error::Conflict(reason)) => {
                tracing::debug!(
                    container = %self.container(),
                    %reason,
                    "Container created concurrently"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Check whether the container exists, without creating it
    pub async fn container_exists(&self) -> Result<bool> {
        let store = &self.store;
        self.call("container_exists", move || store.container_exists())
            .await
            .into_result()
    }

    /// Upload `data` to `key`, overwriting any existing object.
    ///
    /// The attempt count is reported alongside the result.
    pub async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Attempted<ObjectDescriptor> {
        let store = &self.store;
        self.call("put_object", move || {
            store.put_object(key, data.clone(), options.clone())
        })
        .await
    }

    /// Download the full content of `key`.
    ///
    /// The attempt count is reported alongside the result.
    pub async fn get_object(&self, key: &str) -> Attempted<ObjectContent> {
        let store = &self.store;
        self.call("get_object", move || store.get_object(key)).await
    }

    /// Lazily list every object whose key starts with `prefix`, ascending.
    ///
    /// Pages are fetched on demand. Each call starts a fresh listing.
    pub fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Stream<Item = Result<ObjectDescriptor>> + Send + 'a {
        try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                let token = continuation_token.clone();
                let store = &self.store;
                let page = self
                    .call("list_objects", move || store.list_page(prefix, token.clone()))
                    .await
                    .into_result()?;

                for item in page.items {
                    yield item;
                }

                match page.continuation_token {
                    Some(next) if continuation_token.as_ref() == Some(&next) => {
                        Err::<(), _>(Error::General(format!(
                            "listing '{prefix}' returned the same continuation token twice"
                        )))?;
                    }
                    Some(next) => continuation_token = Some(next),
                    None => break,
                }
            }
        }
    }

    /// Run one store call under the timeout and retry policy
    async fn call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.timeout;
        self.retry
            .run(
                move || {
                    let fut = f();
                    async move {
                        match tokio::time::timeout(timeout, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(Error::Timeout(format!(
                                "{operation} did not complete within {timeout:?}"
                            ))),
                        }
                    }
                },
                classify_error,
            )
            .await
    }
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("container", &self.store.container())
            .field("retry", self.retry.policy())
            .field("timeout", &self.timeout)
            .finish()
    }
}
