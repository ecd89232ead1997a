//! Reconcilers for desired-state resources.
//!
//! A reconciler compares one stored object with NetBox and takes the next
//! step towards convergence. Each pass is re-entrant: it may be delivered
//! again at any time and must pick up where the last one stopped.

pub mod device;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use device::DeviceReconciler;

/// What the delivery layer should do after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    /// Deliver the key again after this delay.
    pub requeue_after: Option<Duration>,
}

impl Action {
    /// Nothing left to do until the object changes.
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Run one pass for the object stored under `key`.
    async fn reconcile(&self, key: &str) -> Result<Action>;
}
