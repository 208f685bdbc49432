//! In-memory ObjectStore
//!
//! Keeps objects in a sorted map and supports fault injection, paging and
//! artificial latency. Used by tests and for dry runs without a network.

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Bound;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::traits::{ListPage, ObjectContent, ObjectDescriptor, ObjectStore, PutOptions};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Store operation, used to target injected faults and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ContainerExists,
    CreateContainer,
    Put,
    Get,
    List,
}

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

struct Fault {
    operation: Operation,
    key: Option<String>,
    /// `None` fails forever
    remaining: Option<u32>,
    make_error: ErrorFactory,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: Timestamp,
    etag: String,
    content_type: Option<String>,
}

#[derive(Default)]
struct State {
    container_exists: bool,
    objects: BTreeMap<String, StoredObject>,
    faults: Vec<Fault>,
    calls: HashMap<Operation, u32>,
    creations: u32,
}

/// ObjectStore backed by a `BTreeMap`
pub struct MemoryStore {
    container: String,
    page_size: usize,
    latency: Duration,
    state: Mutex<State>,
}

impl MemoryStore {
    /// A store whose container does not exist yet
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            page_size: DEFAULT_PAGE_SIZE,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
        }
    }

    /// A store whose container already exists
    pub fn with_existing_container(container: impl Into<String>) -> Self {
        let store = Self::new(container);
        store.lock().container_exists = true;
        store
    }

    /// Limit the number of objects returned per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay every operation by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `operation` fail with errors from `make_error`.
    ///
    /// With `key` set, only calls for that key fail. With `times` set, the
    /// fault clears after that many failures; otherwise it is permanent.
    pub fn inject_fault<F>(
        &self,
        operation: Operation,
        key: Option<&str>,
        times: Option<u32>,
        make_error: F,
    ) where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        self.lock().faults.push(Fault {
            operation,
            key: key.map(str::to_string),
            remaining: times,
            make_error: Box::new(make_error),
        });
    }

    /// Insert an object directly, bypassing faults and call counting
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        let data = data.into();
        let mut state = self.lock();
        state.container_exists = true;
        state.objects.insert(key.into(), stored(data, None));
    }

    /// Content of `key`, if present
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    /// Content type recorded for `key`
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().objects.get(key).and_then(|o| o.content_type.clone())
    }

    /// All keys, ascending
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// How many times the container was actually created
    pub fn creation_count(&self) -> u32 {
        self.lock().creations
    }

    /// How many times `operation` was invoked (including failed calls)
    pub fn call_count(&self, operation: Operation) -> u32 {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave State half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, then fire a matching fault if there is one
    async fn enter(&self, operation: Operation, key: Option<&str>) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;

        let position = state.faults.iter().position(|f| {
            f.operation == operation
                && f.remaining != Some(0)
                && match (&f.key, key) {
                    (Some(expected), Some(actual)) => expected == actual,
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        });

        if let Some(index) = position {
            let fault = &mut state.faults[index];
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err((fault.make_error)());
        }

        Ok(())
    }

    fn container_missing(&self) -> Error {
        Error::NotFound(format!("container '{}'", self.container))
    }
}

fn stored(data: Bytes, content_type: Option<String>) -> StoredObject {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    StoredObject {
        data,
        last_modified: Timestamp::now(),
        etag: format!("{:016x}", hasher.finish()),
        content_type,
    }
}

fn describe(key: &str, object: &StoredObject) -> ObjectDescriptor {
    ObjectDescriptor::new(key, object.data.len() as u64, object.last_modified)
        .with_etag(object.etag.clone())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn container(&self) -> String {
        self.container.clone()
    }

    async fn container_exists(&self) -> Result<bool> {
        self.enter(Operation::ContainerExists, None).await?;
        Ok(self.lock().container_exists)
    }

    async fn create_container(&self) -> Result<()> {
        self.enter(Operation::CreateContainer, None).await?;
        let mut state = self.lock();
        if state.container_exists {
            return Err(Error::Conflict(format!(
                "container '{}' already exists",
                self.container
            )));
        }
        state.container_exists = true;
        state.creations += 1;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<ObjectDescriptor> {
        self.enter(Operation::Put, Some(key)).await?;
        let mut state = self.lock();
        if !state.container_exists {
            return Err(self.container_missing());
        }
        let object = stored(data, options.content_type);
        let descriptor = describe(key, &object);
        state.objects.insert(key.to_string(), object);
        Ok(descriptor)
    }

    async fn get_object(&self, key: &str) -> Result<ObjectContent> {
        self.enter(Operation::Get, Some(key)).await?;
        let state = self.lock();
        if !state.container_exists {
            return Err(self.container_missing());
        }
        state
            .objects
            .get(key)
            .map(|o| ObjectContent::new(o.data.clone()))
            .ok_or_else(|| Error::NotFound(format!("{}/{key}", self.container)))
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        self.enter(Operation::List, None).await?;
        let state = self.lock();
        if !state.container_exists {
            return Err(self.container_missing());
        }

        let start = match continuation_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix.to_string()),
        };

        let mut items: Vec<ObjectDescriptor> = state
            .objects
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, object)| describe(key, object))
            .collect();

        let continuation_token = if items.len() > self.page_size {
            items.truncate(self.page_size);
            items.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            items,
            continuation_token,
        })
    }
}
