pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod manifest;
pub mod netbox;
pub mod reconciler;
pub mod store;
pub mod test_util;

pub use config::Config;
pub use controller::Controller;
pub use device::{Device, DeviceSpec, DeviceState, DeviceStatus};
pub use error::{Error, Result};
pub use netbox::{Inventory, NetboxClient, NetboxServer, SupportedResource};
pub use reconciler::{Action, DeviceReconciler, Reconciler};
pub use store::{MemoryStore, ObjectStore, StoreEvent};
