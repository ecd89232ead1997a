//! NetBox inventory access.
//!
//! - `client`: REST client for the DCIM endpoints
//! - `resolver`: site / role / device type name to id resolution
//! - `device`: idempotent device create, update and delete

pub mod client;
pub mod device;
pub mod resolver;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::Result;

pub use client::NetboxClient;
pub use device::DeviceSync;
pub use resolver::{IdentityResolver, ResolvedIds};

/// Entity categories a device spec refers to by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Site,
    Role,
    Type,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Site => write!(f, "site"),
            Category::Role => write!(f, "role"),
            Category::Type => write!(f, "type"),
        }
    }
}

/// One page of a NetBox list response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>) -> Self {
        Self {
            count: results.len() as u64,
            results,
        }
    }
}

/// Nested reference to a site or device role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamedRef {
    pub id: i64,
    #[serde(alias = "model")]
    pub name: String,
}

/// Nested reference to a device type, named by its model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelRef {
    pub id: i64,
    pub model: String,
}

/// Device record as returned by NetBox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawDeviceRecord")]
pub struct DeviceRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub site: NamedRef,
    pub role: NamedRef,
    pub device_type: ModelRef,
}

/// Wire shape of a device record. NetBox 3.6 and 3.7 send the role under
/// both `role` and `device_role`; older releases only send `device_role`.
#[derive(Deserialize)]
struct RawDeviceRecord {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    site: NamedRef,
    #[serde(default)]
    role: Option<NamedRef>,
    #[serde(default)]
    device_role: Option<NamedRef>,
    device_type: ModelRef,
}

impl TryFrom<RawDeviceRecord> for DeviceRecord {
    type Error = String;

    fn try_from(raw: RawDeviceRecord) -> std::result::Result<Self, Self::Error> {
        let role = raw
            .role
            .or(raw.device_role)
            .ok_or_else(|| format!("device {} has no role", raw.id))?;
        Ok(Self {
            id: raw.id,
            name: raw.name,
            site: raw.site,
            role,
            device_type: raw.device_type,
        })
    }
}

/// Writable fields submitted on device create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WritableDevice {
    pub name: String,
    pub role: i64,
    pub device_type: i64,
    pub site: i64,
    pub tags: Vec<i64>,
}

/// Typed DCIM operations the sync client needs from NetBox.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// List devices, filtered by exact name when given.
    async fn list_devices(&self, name: Option<&str>) -> Result<Page<DeviceRecord>>;

    async fn create_device(&self, fields: &WritableDevice) -> Result<DeviceRecord>;

    async fn update_device(&self, id: i64, fields: &WritableDevice) -> Result<DeviceRecord>;

    async fn delete_device(&self, id: i64) -> Result<()>;

    /// List sites, roles or device types matching `name` exactly.
    async fn list_refs(&self, category: Category, name: &str) -> Result<Page<NamedRef>>;
}

#[async_trait]
impl<T: Inventory + ?Sized> Inventory for Arc<T> {
    async fn list_devices(&self, name: Option<&str>) -> Result<Page<DeviceRecord>> {
        (**self).list_devices(name).await
    }

    async fn create_device(&self, fields: &WritableDevice) -> Result<DeviceRecord> {
        (**self).create_device(fields).await
    }

    async fn update_device(&self, id: i64, fields: &WritableDevice) -> Result<DeviceRecord> {
        (**self).update_device(id, fields).await
    }

    async fn delete_device(&self, id: i64) -> Result<()> {
        (**self).delete_device(id).await
    }

    async fn list_refs(&self, category: Category, name: &str) -> Result<Page<NamedRef>> {
        (**self).list_refs(category, name).await
    }
}

/// Closed set of resource kinds that can be synced to NetBox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum SupportedResource {
    Device(Device),
}

impl SupportedResource {
    pub fn kind(&self) -> &'static str {
        match self {
            SupportedResource::Device(_) => crate::device::DEVICE_KIND,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SupportedResource::Device(d) => d.name(),
        }
    }
}

/// Dispatches manifests to the sync client for their kind.
pub struct NetboxServer<I> {
    devices: DeviceSync<I>,
}

impl<I: Inventory> NetboxServer<I> {
    pub fn new(inventory: I) -> Self {
        Self {
            devices: DeviceSync::new(inventory),
        }
    }

    pub fn devices(&self) -> &DeviceSync<I> {
        &self.devices
    }

    /// Create or update the NetBox record for `resource`.
    pub async fn apply(&self, resource: &mut SupportedResource) -> Result<()> {
        match resource {
            SupportedResource::Device(d) => self.devices.apply(d).await,
        }
    }

    /// Remove the NetBox record for `resource`, if any.
    pub async fn delete(&self, resource: &mut SupportedResource) -> Result<()> {
        match resource {
            SupportedResource::Device(d) => self.devices.delete(d).await,
        }
    }
}
