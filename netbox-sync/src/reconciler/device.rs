//! Device reconciler - converges stored `Device` objects with NetBox.
//!
//! Pass order:
//! 1. no finalizer: register it and stop, so the marker is durable before
//!    anything is created in NetBox
//! 2. deletion requested: delete the record, then drop the finalizer
//! 3. `observedGeneration == generation`: nothing to do
//! 4. otherwise create or update, then record status
//!
//! NetBox failures never fail the pass. They leave the stored object as it
//! was and ask for another delivery after the retry interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::{Action, Reconciler};
use crate::config::Config;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::netbox::{DeviceSync, Inventory};
use crate::store::ObjectStore;

/// Reconciler for `Device` objects.
pub struct DeviceReconciler<I> {
    store: Arc<dyn ObjectStore>,
    netbox: DeviceSync<I>,
    retry_interval: Duration,
}

impl<I: Inventory> DeviceReconciler<I> {
    pub fn new(store: Arc<dyn ObjectStore>, inventory: I, config: &Config) -> Self {
        Self {
            store,
            netbox: DeviceSync::new(inventory),
            retry_interval: config.retry_interval,
        }
    }

    pub fn netbox(&self) -> &DeviceSync<I> {
        &self.netbox
    }

    async fn register_finalizer(&self, mut dev: Device) -> Result<Action> {
        dev.add_finalizer();
        self.store.update(&dev).await.inspect_err(|e| {
            error!(name = dev.name(), error = %e, "unable to register finalizer");
        })?;
        info!(name = dev.name(), "registered finalizer");

        Ok(Action::requeue(Duration::ZERO))
    }

    async fn apply(&self, mut dev: Device) -> Result<Action> {
        let generation = dev.metadata.generation;
        debug!(name = dev.name(), generation, "applying device");

        if let Err(e) = self.netbox.apply(&mut dev).await {
            error!(name = dev.name(), error = %e, "failed to apply device, retrying");
            return Ok(Action::requeue(self.retry_interval));
        }

        dev.status.observed_generation = generation;
        self.store.update_status(&dev).await.inspect_err(|e| {
            error!(name = dev.name(), error = %e, "unable to update device status");
        })?;
        info!(name = dev.name(), id = ?dev.status.id, generation, "device in sync");

        Ok(Action::await_change())
    }

    async fn finalize(&self, mut dev: Device) -> Result<Action> {
        debug!(name = dev.name(), "finalizing device");

        if let Err(e) = self.netbox.delete(&mut dev).await {
            error!(name = dev.name(), error = %e, "failed to delete device, retrying");
            return Ok(Action::requeue(self.retry_interval));
        }

        let mut dev = self.store.update_status(&dev).await?;
        dev.remove_finalizer();
        self.store.update(&dev).await?;
        info!(name = dev.name(), "device deleted, finalizer removed");

        Ok(Action::await_change())
    }
}

#[async_trait]
impl<I: Inventory> Reconciler for DeviceReconciler<I> {
    async fn reconcile(&self, key: &str) -> Result<Action> {
        debug!(key, "reconcile");

        let dev = match self.store.get(key).await {
            Ok(dev) => dev,
            Err(Error::NotFound(_)) => {
                debug!(key, "object gone, nothing to do");
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e),
        };

        // Never marked, so nothing was ever created for it
        if dev.is_deleting() && !dev.has_finalizer() {
            return Ok(Action::await_change());
        }

        if !dev.has_finalizer() {
            return self.register_finalizer(dev).await;
        }

        if dev.is_deleting() {
            return self.finalize(dev).await;
        }

        if dev.is_synced() {
            debug!(key, "spec unchanged since last sync, doing nothing");
            return Ok(Action::await_change());
        }

        self.apply(dev).await
    }
}
