//! Manifest loading and the desired-state file watcher.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::netbox::SupportedResource;
use crate::store::ObjectStore;

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Many(Vec<SupportedResource>),
    One(Box<SupportedResource>),
}

/// Parse a JSON manifest holding one resource or an array of resources.
pub fn parse_manifests(raw: &str) -> Result<Vec<SupportedResource>> {
    let doc: ManifestDocument =
        serde_json::from_str(raw).map_err(|e| Error::Manifest(e.to_string()))?;
    Ok(match doc {
        ManifestDocument::Many(resources) => resources,
        ManifestDocument::One(resource) => vec![*resource],
    })
}

pub async fn load_manifests(path: &Path) -> Result<Vec<SupportedResource>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Manifest(format!("{}: {}", path.display(), e)))?;
    parse_manifests(&raw).map_err(|e| match e {
        Error::Manifest(msg) => Error::Manifest(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Mirrors a manifest file into the object store.
///
/// Resources in the file are created or updated; resources that disappear
/// from the file get deletion requested.
pub struct ManifestSource {
    path: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    /// Bring the store in line with the file once.
    pub async fn sync(&self) -> Result<()> {
        let resources = load_manifests(&self.path).await?;
        let mut desired = HashSet::new();

        for resource in resources {
            let SupportedResource::Device(dev) = resource;
            if !desired.insert(dev.name().to_string()) {
                warn!(name = dev.name(), "duplicate name in manifest, keeping the first");
                continue;
            }

            match self.store.get(dev.name()).await {
                Ok(mut stored) => {
                    if stored.is_deleting() || stored.spec == dev.spec {
                        continue;
                    }
                    info!(name = dev.name(), "spec changed");
                    stored.spec = dev.spec;
                    self.store.update(&stored).await?;
                }
                Err(Error::NotFound(_)) => {
                    info!(name = dev.name(), "new device");
                    self.store.create(dev).await?;
                }
                Err(e) => return Err(e),
            }
        }

        for stored in self.store.list().await? {
            if !desired.contains(stored.name()) && !stored.is_deleting() {
                info!(name = stored.name(), "removed from manifest, requesting deletion");
                self.store.request_delete(stored.name()).await?;
            }
        }
        Ok(())
    }

    /// Re-read the file every `poll_interval` until the task is dropped.
    pub async fn watch(self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            match self.sync().await {
                Ok(()) => debug!(path = %self.path.display(), "manifest synced"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "manifest sync failed"),
            }
        }
    }
}
