//! Desired-state object store.
//!
//! The reconciler reads and writes `Device` objects through [`ObjectStore`].
//! [`MemoryStore`] is the in-process implementation used by the controller
//! mode and by tests. It keeps the contract the reconciler relies on:
//! - `generation` changes only when `spec` changes
//! - every write must carry the current `resource_version`
//! - an object pending deletion is purged once its finalizers are gone

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use crate::device::Device;
use crate::error::{Error, Result};

/// Events emitted when stored objects change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// An object was created or written.
    Changed { name: String },
    /// An object was purged from the store.
    Purged { name: String },
}

impl StoreEvent {
    pub fn name(&self) -> &str {
        match self {
            StoreEvent::Changed { name } | StoreEvent::Purged { name } => name,
        }
    }
}

/// Store trait for desired `Device` objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Device>;

    async fn list(&self) -> Result<Vec<Device>>;

    /// Store a new object at generation 1.
    async fn create(&self, device: Device) -> Result<Device>;

    /// Write metadata and spec. Status is left as stored.
    async fn update(&self, device: &Device) -> Result<Device>;

    /// Write status only.
    async fn update_status(&self, device: &Device) -> Result<Device>;

    /// Mark an object for deletion.
    async fn request_delete(&self, name: &str) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Event channel capacity.
const EVENT_CAPACITY: usize = 1024;

pub struct MemoryStore {
    objects: RwLock<HashMap<String, Device>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn check_version(stored: &Device, incoming: &Device) -> Result<()> {
        let expected = stored.metadata.resource_version;
        let actual = incoming.metadata.resource_version;
        if expected != actual {
            return Err(Error::PersistenceConflict(format!(
                "{}: resource version mismatch, expected {}, got {}",
                incoming.name(),
                expected,
                actual
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Device> {
        self.objects
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self.objects.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(devices)
    }

    async fn create(&self, mut device: Device) -> Result<Device> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(device.name()) {
            return Err(Error::PersistenceConflict(format!(
                "{} already exists",
                device.name()
            )));
        }

        device.metadata.uid = Some(Uuid::new_v4().to_string());
        device.metadata.generation = 1;
        device.metadata.resource_version = 1;
        device.metadata.deletion_timestamp = None;
        device.status = Default::default();
        objects.insert(device.name().to_string(), device.clone());
        drop(objects);

        debug!(name = device.name(), "stored new object");
        self.emit(StoreEvent::Changed {
            name: device.name().to_string(),
        });
        Ok(device)
    }

    async fn update(&self, device: &Device) -> Result<Device> {
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(device.name())
            .ok_or_else(|| Error::NotFound(device.name().to_string()))?;
        Self::check_version(stored, device)?;

        let mut next = stored.clone();
        if next.spec != device.spec {
            next.spec = device.spec.clone();
            next.metadata.generation += 1;
        }
        next.metadata.finalizers = device.metadata.finalizers.clone();
        next.metadata.resource_version += 1;

        let name = next.name().to_string();
        if next.is_deleting() && next.metadata.finalizers.is_empty() {
            objects.remove(&name);
            drop(objects);
            debug!(name = %name, "purged object");
            self.emit(StoreEvent::Purged { name });
            return Ok(next);
        }

        objects.insert(name.clone(), next.clone());
        drop(objects);
        self.emit(StoreEvent::Changed { name });
        Ok(next)
    }

    async fn update_status(&self, device: &Device) -> Result<Device> {
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(device.name())
            .ok_or_else(|| Error::NotFound(device.name().to_string()))?;
        Self::check_version(stored, device)?;

        stored.status = device.status.clone();
        stored.metadata.resource_version += 1;
        let next = stored.clone();
        drop(objects);

        self.emit(StoreEvent::Changed {
            name: next.name().to_string(),
        });
        Ok(next)
    }

    async fn request_delete(&self, name: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if stored.metadata.finalizers.is_empty() {
            objects.remove(name);
            drop(objects);
            debug!(name, "purged object without finalizers");
            self.emit(StoreEvent::Purged {
                name: name.to_string(),
            });
            return Ok(());
        }

        if stored.metadata.deletion_timestamp.is_none() {
            stored.metadata.deletion_timestamp = Some(Utc::now());
            stored.metadata.resource_version += 1;
        }
        drop(objects);

        self.emit(StoreEvent::Changed {
            name: name.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
