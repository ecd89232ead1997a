//! Error types shared by the sync client, the reconciler and the object store.

use thiserror::Error;

use crate::netbox::Category;

/// Errors that can occur while converging a desired object with NetBox.
#[derive(Debug, Error)]
pub enum Error {
    /// More than one NetBox record matches a desired object's name.
    #[error("{count} matching devices found for {name:?}, cannot proceed")]
    AmbiguousRecord { name: String, count: u64 },

    /// A referenced site, role or device type did not resolve to exactly one entity.
    #[error("unexpected number of {category}s {name:?} found: {matches}")]
    NameResolution {
        category: Category,
        name: String,
        matches: u64,
    },

    /// Transport failure or error response from NetBox.
    #[error("netbox unavailable: {0}")]
    RemoteUnavailable(String),

    /// NetBox answered with data that cannot describe a live record.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// A status or marker write lost a race with a newer write.
    #[error("conflict: {0}")]
    PersistenceConflict(String),

    /// Object not found in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Desired spec failed validation.
    #[error("invalid spec for {name:?}: {reason}")]
    InvalidSpec { name: String, reason: String },

    /// Manifest could not be read or decoded.
    #[error("manifest: {0}")]
    Manifest(String),
}

impl Error {
    /// Whether the delivery layer should retry without backoff.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::PersistenceConflict(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteUnavailable(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, Error>;
