//! Device sync - idempotent create, update and delete of NetBox devices.
//!
//! Every mutating operation first looks the device up by name, so a retry
//! after a crash never creates a second record or deletes twice.

use tracing::{debug, info, warn};

use super::resolver::{IdentityResolver, ResolvedIds};
use super::{DeviceRecord, Inventory, WritableDevice};
use crate::device::{Device, DeviceSpec, DeviceState, DeviceStatus, ObjectMeta};
use crate::error::{Error, Result};

/// Sync client for `Device` resources.
pub struct DeviceSync<I> {
    inventory: I,
}

impl<I: Inventory> DeviceSync<I> {
    pub fn new(inventory: I) -> Self {
        Self { inventory }
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    /// Look up the device record named `name`.
    ///
    /// More than one match is never resolved by picking one.
    pub async fn exists(&self, name: &str) -> Result<Option<DeviceRecord>> {
        let page = self.inventory.list_devices(Some(name)).await?;
        if page.count > 1 {
            warn!(name, count = page.count, "found more than one matching device");
            return Err(Error::AmbiguousRecord {
                name: name.to_string(),
                count: page.count,
            });
        }
        if page.count == 0 {
            return Ok(None);
        }

        debug!(name, "found exactly one device");
        match page.results.into_iter().next() {
            Some(record) => Ok(Some(record)),
            None => Err(Error::IntegrityViolation(format!(
                "device count for {:?} is 1 but no record was returned",
                name
            ))),
        }
    }

    /// Create or update the device so NetBox matches `dev.spec`.
    pub async fn apply(&self, dev: &mut Device) -> Result<()> {
        dev.spec.validate(dev.name())?;

        match self.exists(dev.name()).await? {
            Some(record) => self.update(dev, record.id).await,
            None => self.create(dev).await,
        }
    }

    /// Delete the device's record. A missing record counts as deleted.
    pub async fn delete(&self, dev: &mut Device) -> Result<()> {
        // The record may be gone already, or a previous create never finished
        let Some(record) = self.exists(dev.name()).await? else {
            debug!(name = dev.name(), "device not found, nothing to delete");
            dev.clear_identity();
            return Ok(());
        };

        // The record found by name is the one that still exists
        let id = record.id;
        if let Some(stale) = dev.status.id.filter(|stale| *stale != id) {
            warn!(
                name = dev.name(),
                stale,
                id,
                "recorded id differs from the record found by name, deleting the found record"
            );
        }
        self.inventory.delete_device(id).await?;
        info!(name = dev.name(), id, "deleted device");

        dev.clear_identity();
        Ok(())
    }

    /// List NetBox devices as desired-state objects, optionally by exact name.
    pub async fn list(&self, name: Option<&str>) -> Result<Vec<Device>> {
        let page = self.inventory.list_devices(name).await?;
        debug!(count = page.count, "found devices");

        Ok(page.results.into_iter().map(record_to_device).collect())
    }

    async fn create(&self, dev: &mut Device) -> Result<()> {
        let ids = IdentityResolver::new(&self.inventory)
            .resolve_all(&dev.spec)
            .await?;

        let record = self
            .inventory
            .create_device(&writable(dev.name(), &ids))
            .await?;
        info!(name = dev.name(), id = record.id, "created device");

        dev.set_ready(record.id)
    }

    async fn update(&self, dev: &mut Device, id: i64) -> Result<()> {
        let ids = IdentityResolver::new(&self.inventory)
            .resolve_all(&dev.spec)
            .await?;

        let record = self
            .inventory
            .update_device(id, &writable(dev.name(), &ids))
            .await?;
        info!(name = dev.name(), id = record.id, "updated device");

        dev.set_ready(record.id)
    }
}

fn writable(name: &str, ids: &ResolvedIds) -> WritableDevice {
    WritableDevice {
        name: name.to_string(),
        role: ids.role,
        device_type: ids.device_type,
        site: ids.site,
        tags: Vec::new(),
    }
}

fn record_to_device(record: DeviceRecord) -> Device {
    let spec = DeviceSpec {
        site: record.site.name,
        device_type: record.device_type.model,
        role: record.role.name,
    };
    Device {
        metadata: ObjectMeta {
            name: record.name.unwrap_or_default(),
            ..Default::default()
        },
        status: DeviceStatus {
            id: Some(record.id),
            state: DeviceState::Ready,
            observed_generation: 0,
        },
        ..Device::new(String::new(), spec)
    }
}
