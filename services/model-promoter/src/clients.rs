//! Narrow interfaces over the external collaborators: the registry object
//! store, the change-notification queue and the serving endpoint's
//! resource-management API.
//!
//! The pipeline only ever talks through these traits; SDK-backed clients
//! slot in behind them without touching the core. The in-memory
//! implementations below back the test suites and local runs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(&self, container: &str) -> Result<Vec<String>>;
    async fn download_object(&self, container: &str, name: &str) -> Result<Vec<u8>>;
    /// Public URI of an object, as it would appear in a change notification.
    fn object_uri(&self, container: &str, name: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle(pub String);

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub handle: MessageHandle,
    pub body: String,
}

#[async_trait]
pub trait ChangeQueue: Send + Sync {
    /// Receive at most one message, waiting up to `timeout`. A received
    /// message stays in flight until `delete` acknowledges it.
    async fn receive_one(&self, timeout: Duration) -> Result<Option<QueueMessage>>;
    /// Non-destructive check for further pending messages.
    async fn has_pending(&self) -> Result<bool>;
    async fn delete(&self, handle: &MessageHandle) -> Result<()>;
}

/// Identifies the serving app inside the resource-management API.
#[derive(Debug, Clone)]
pub struct DeployApp {
    pub subscription: String,
    pub resource_group: String,
    pub name: String,
}

#[async_trait]
pub trait DeployTarget: Send + Sync {
    async fn fetch_settings(&self, app: &DeployApp) -> Result<HashMap<String, String>>;
    async fn apply_settings(&self, app: &DeployApp, settings: HashMap<String, String>) -> Result<()>;
}

// ---- in-memory implementations ----

#[derive(Default)]
pub struct InMemoryObjectStore {
    base_url: String,
    containers: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), containers: RwLock::new(HashMap::new()) }
    }

    pub fn put_object(&self, container: &str, name: &str, bytes: Vec<u8>) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(name.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        let containers = self.containers.read();
        let mut names: Vec<String> = containers
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn download_object(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        self.containers
            .read()
            .get(container)
            .and_then(|objects| objects.get(name))
            .cloned()
            .ok_or_else(|| anyhow!("object `{container}/{name}` not found"))
    }

    fn object_uri(&self, container: &str, name: &str) -> String {
        format!("{}/{container}/{name}", self.base_url)
    }
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: usize,
}

#[derive(Default)]
pub struct InMemoryChangeQueue {
    inner: Mutex<QueueInner>,
}

impl InMemoryChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, body: impl Into<String>) -> MessageHandle {
        let handle = MessageHandle(uuid::Uuid::new_v4().to_string());
        self.inner
            .lock()
            .pending
            .push_back(QueueMessage { handle: handle.clone(), body: body.into() });
        handle
    }

    pub fn deleted_count(&self) -> usize {
        self.inner.lock().deleted
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Make every undeleted in-flight message visible again, the way a real
    /// queue does once a visibility timeout lapses.
    pub fn requeue_in_flight(&self) {
        let mut inner = self.inner.lock();
        let redelivered: Vec<QueueMessage> = inner.in_flight.drain().map(|(_, m)| m).collect();
        for message in redelivered {
            inner.pending.push_back(message);
        }
    }
}

#[async_trait]
impl ChangeQueue for InMemoryChangeQueue {
    async fn receive_one(&self, _timeout: Duration) -> Result<Option<QueueMessage>> {
        let mut inner = self.inner.lock();
        let Some(message) = inner.pending.pop_front() else {
            return Ok(None);
        };
        inner.in_flight.insert(message.handle.0.clone(), message.clone());
        Ok(Some(message))
    }

    async fn has_pending(&self) -> Result<bool> {
        Ok(!self.inner.lock().pending.is_empty())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.in_flight.remove(&handle.0).is_some() {
            inner.deleted += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDeployTarget {
    apps: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryDeployTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_app(&self, name: &str) {
        self.apps.write().entry(name.to_string()).or_default();
    }

    pub fn settings(&self, name: &str) -> Option<HashMap<String, String>> {
        self.apps.read().get(name).cloned()
    }
}

#[async_trait]
impl DeployTarget for InMemoryDeployTarget {
    async fn fetch_settings(&self, app: &DeployApp) -> Result<HashMap<String, String>> {
        self.apps
            .read()
            .get(&app.name)
            .cloned()
            .ok_or_else(|| anyhow!("settings resource for app `{}` not found", app.name))
    }

    async fn apply_settings(&self, app: &DeployApp, settings: HashMap<String, String>) -> Result<()> {
        let mut apps = self.apps.write();
        match apps.get_mut(&app.name) {
            Some(existing) => {
                *existing = settings;
                Ok(())
            }
            None => Err(anyhow!("settings resource for app `{}` not found", app.name)),
        }
    }
}
