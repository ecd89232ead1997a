//! In-memory NetBox stand-in for unit and integration tests.
//!
//! Records every call so tests can assert that a pass made no remote
//! requests, and can be switched into failure modes.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::netbox::{
    Category, DeviceRecord, Inventory, ModelRef, NamedRef, Page, WritableDevice,
};

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub device_lists: u32,
    pub creates: u32,
    pub updates: u32,
    pub deletes: u32,
    pub ref_lookups: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.device_lists + self.creates + self.updates + self.deletes + self.ref_lookups
    }
}

struct FakeState {
    next_device_id: i64,
    next_ref_id: i64,
    devices: BTreeMap<i64, DeviceRecord>,
    refs: Vec<(Category, NamedRef)>,
    calls: CallCounts,
    failure: Option<String>,
    zero_ids: bool,
}

pub struct FakeInventory {
    state: Mutex<FakeState>,
}

impl Default for FakeInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::with_next_id(1)
    }

    /// Start assigning device ids at `id`.
    pub fn with_next_id(id: i64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_device_id: id,
                next_ref_id: 1000,
                devices: BTreeMap::new(),
                refs: Vec::new(),
                calls: CallCounts::default(),
                failure: None,
                zero_ids: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake inventory lock poisoned")
    }

    /// Register a site, role or device type and return its id.
    pub fn add_ref(&self, category: Category, name: &str) -> i64 {
        let mut state = self.state();
        let id = state.next_ref_id;
        state.next_ref_id += 1;
        state.refs.push((
            category,
            NamedRef {
                id,
                name: name.to_string(),
            },
        ));
        id
    }

    /// Insert a device directly, as if created outside the sync client.
    pub fn add_device(&self, name: &str, site: &str, role: &str, device_type: &str) -> i64 {
        let mut state = self.state();
        let id = state.next_device_id;
        state.next_device_id += 1;
        let record = DeviceRecord {
            id,
            name: Some(name.to_string()),
            site: state.named(Category::Site, site),
            role: state.named(Category::Role, role),
            device_type: ModelRef {
                id: state.named(Category::Type, device_type).id,
                model: device_type.to_string(),
            },
        };
        state.devices.insert(id, record);
        id
    }

    /// Remove a device behind the sync client's back.
    pub fn remove_device(&self, id: i64) {
        self.state().devices.remove(&id);
    }

    pub fn device(&self, id: i64) -> Option<DeviceRecord> {
        self.state().devices.get(&id).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.state().devices.len()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn reset_calls(&self) {
        self.state().calls = CallCounts::default();
    }

    /// Fail every subsequent call with `RemoteUnavailable` until cleared.
    pub fn fail_with(&self, message: Option<&str>) {
        self.state().failure = message.map(str::to_string);
    }

    /// Answer creates and updates with id 0.
    pub fn return_zero_ids(&self, enabled: bool) {
        self.state().zero_ids = enabled;
    }
}

impl FakeState {
    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(msg) => Err(Error::RemoteUnavailable(msg.clone())),
            None => Ok(()),
        }
    }

    fn named(&self, category: Category, name: &str) -> NamedRef {
        self.refs
            .iter()
            .find(|(c, r)| *c == category && r.name == name)
            .map(|(_, r)| r.clone())
            .unwrap_or(NamedRef {
                id: 0,
                name: name.to_string(),
            })
    }

    fn by_id(&self, category: Category, id: i64) -> Result<NamedRef> {
        self.refs
            .iter()
            .find(|(c, r)| *c == category && r.id == id)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| Error::RemoteUnavailable(format!("400 Bad Request: unknown {} {}", category, id)))
    }

    fn record(&self, id: i64, fields: &WritableDevice) -> Result<DeviceRecord> {
        let device_type = self.by_id(Category::Type, fields.device_type)?;
        Ok(DeviceRecord {
            id,
            name: Some(fields.name.clone()),
            site: self.by_id(Category::Site, fields.site)?,
            role: self.by_id(Category::Role, fields.role)?,
            device_type: ModelRef {
                id: device_type.id,
                model: device_type.name,
            },
        })
    }

    fn answer(&self, mut record: DeviceRecord) -> DeviceRecord {
        if self.zero_ids {
            record.id = 0;
        }
        record
    }
}

#[async_trait]
impl Inventory for FakeInventory {
    async fn list_devices(&self, name: Option<&str>) -> Result<Page<DeviceRecord>> {
        let mut state = self.state();
        state.calls.device_lists += 1;
        state.check()?;
        let results = state
            .devices
            .values()
            .filter(|d| name.is_none() || d.name.as_deref() == name)
            .cloned()
            .collect();
        Ok(Page::new(results))
    }

    async fn create_device(&self, fields: &WritableDevice) -> Result<DeviceRecord> {
        let mut state = self.state();
        state.calls.creates += 1;
        state.check()?;
        let id = state.next_device_id;
        let record = state.record(id, fields)?;
        state.next_device_id += 1;
        state.devices.insert(id, record.clone());
        Ok(state.answer(record))
    }

    async fn update_device(&self, id: i64, fields: &WritableDevice) -> Result<DeviceRecord> {
        let mut state = self.state();
        state.calls.updates += 1;
        state.check()?;
        if !state.devices.contains_key(&id) {
            return Err(Error::RemoteUnavailable("404 Not Found".to_string()));
        }
        let record = state.record(id, fields)?;
        state.devices.insert(id, record.clone());
        Ok(state.answer(record))
    }

    async fn delete_device(&self, id: i64) -> Result<()> {
        let mut state = self.state();
        state.calls.deletes += 1;
        state.check()?;
        state.devices.remove(&id);
        Ok(())
    }

    async fn list_refs(&self, category: Category, name: &str) -> Result<Page<NamedRef>> {
        let mut state = self.state();
        state.calls.ref_lookups += 1;
        state.check()?;
        let results = state
            .refs
            .iter()
            .filter(|(c, r)| *c == category && r.name == name)
            .map(|(_, r)| r.clone())
            .collect();
        Ok(Page::new(results))
    }
}
