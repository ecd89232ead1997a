//! Device resource - the desired state of one NetBox DCIM device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEVICE_KIND: &str = "Device";
pub const API_VERSION: &str = "netbox.networkop.co.uk/v1";

/// Cleanup marker registered before anything is created in NetBox.
pub const DEVICE_FINALIZER: &str = "finalizers.netbox.networkop.co.uk";

/// Upper bound for site, role and device type names.
const MAX_NAME_LEN: usize = 63;

/// Object metadata maintained by the store and the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Bumped by the store whenever `spec` changes.
    #[serde(default)]
    pub generation: i64,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

/// Desired state of a NetBox device. Every field names an existing NetBox entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Name of an existing NetBox site.
    pub site: String,
    /// Model of an existing NetBox device type.
    pub device_type: String,
    /// Name of an existing NetBox device role.
    pub role: String,
}

impl DeviceSpec {
    /// Check that every reference is present and fits NetBox's name length.
    pub fn validate(&self, name: &str) -> Result<()> {
        for (field, value) in [
            ("site", &self.site),
            ("device_type", &self.device_type),
            ("role", &self.role),
        ] {
            if value.is_empty() || value.len() > MAX_NAME_LEN {
                return Err(Error::InvalidSpec {
                    name: name.to_string(),
                    reason: format!("{} must be 1-{} characters", field, MAX_NAME_LEN),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Ready,
}

/// Observed state of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// NetBox record id, set once the device exists in NetBox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub state: DeviceState,
    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: DeviceSpec,
    #[serde(default)]
    pub status: DeviceStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

impl Device {
    pub fn new(name: impl Into<String>, spec: DeviceSpec) -> Self {
        Self {
            api_version: default_api_version(),
            metadata: ObjectMeta {
                name: name.into(),
                ..Default::default()
            },
            spec,
            status: DeviceStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata.finalizers.iter().any(|f| f == DEVICE_FINALIZER)
    }

    pub fn add_finalizer(&mut self) {
        if !self.has_finalizer() {
            self.metadata.finalizers.push(DEVICE_FINALIZER.to_string());
        }
    }

    pub fn remove_finalizer(&mut self) {
        self.metadata.finalizers.retain(|f| f != DEVICE_FINALIZER);
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the last successful sync already covers the current spec.
    pub fn is_synced(&self) -> bool {
        self.status.observed_generation == self.metadata.generation
    }

    /// Record NetBox's identity for this device.
    pub(crate) fn set_ready(&mut self, id: i64) -> Result<()> {
        if id == 0 {
            return Err(Error::IntegrityViolation(format!(
                "unexpected device id 0 for {:?}",
                self.metadata.name
            )));
        }
        self.status.id = Some(id);
        self.status.state = DeviceState::Ready;
        Ok(())
    }

    pub(crate) fn clear_identity(&mut self) {
        self.status.id = None;
        self.status.state = DeviceState::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeviceSpec {
        DeviceSpec {
            site: "NYC".to_string(),
            device_type: "ISR4451".to_string(),
            role: "router".to_string(),
        }
    }

    #[test]
    fn test_finalizer_is_added_once() {
        let mut dev = Device::new("r1", spec());
        dev.add_finalizer();
        dev.add_finalizer();
        assert_eq!(dev.metadata.finalizers, vec![DEVICE_FINALIZER.to_string()]);

        dev.remove_finalizer();
        assert!(!dev.has_finalizer());
    }

    #[test]
    fn test_validate_rejects_empty_and_long_names() {
        assert!(spec().validate("r1").is_ok());

        let mut empty = spec();
        empty.role.clear();
        assert!(matches!(
            empty.validate("r1"),
            Err(Error::InvalidSpec { .. })
        ));

        let mut long = spec();
        long.site = "x".repeat(64);
        assert!(long.validate("r1").is_err());
    }

    #[test]
    fn test_set_ready_rejects_zero_id() {
        let mut dev = Device::new("r1", spec());
        assert!(matches!(
            dev.set_ready(0),
            Err(Error::IntegrityViolation(_))
        ));
        assert_eq!(dev.status.id, None);

        dev.set_ready(42).unwrap();
        assert_eq!(dev.status.id, Some(42));
        assert_eq!(dev.status.state, DeviceState::Ready);
    }

    #[test]
    fn test_manifest_field_names() {
        let dev: Device = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "r1" },
            "spec": { "site": "NYC", "device_type": "ISR4451", "role": "router" }
        }))
        .unwrap();
        assert_eq!(dev.api_version, API_VERSION);
        assert_eq!(dev.spec, spec());
        assert_eq!(dev.status, DeviceStatus::default());

        let value = serde_json::to_value(&dev).unwrap();
        assert_eq!(value["status"]["state"], "");
        assert_eq!(value["status"]["observedGeneration"], 0);
    }
}
