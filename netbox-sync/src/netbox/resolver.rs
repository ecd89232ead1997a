//! Resolves human-readable site, role and device type names to NetBox ids.
//!
//! Lookups are never cached: every create or update resolves all three
//! references again so a renamed entity is never addressed by a stale id.

use tracing::debug;

use super::{Category, Inventory};
use crate::device::DeviceSpec;
use crate::error::{Error, Result};

/// Ids a device spec resolved to, valid for a single create or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIds {
    pub role: i64,
    pub device_type: i64,
    pub site: i64,
}

pub struct IdentityResolver<'a, I: ?Sized> {
    inventory: &'a I,
}

impl<'a, I: Inventory + ?Sized> IdentityResolver<'a, I> {
    pub fn new(inventory: &'a I) -> Self {
        Self { inventory }
    }

    /// Resolve `name` within `category`. Anything but exactly one match fails.
    pub async fn resolve(&self, category: Category, name: &str) -> Result<i64> {
        let page = self.inventory.list_refs(category, name).await?;
        match page.results.as_slice() {
            [only] if page.count == 1 => Ok(only.id),
            _ => Err(Error::NameResolution {
                category,
                name: name.to_string(),
                matches: page.count,
            }),
        }
    }

    /// Resolve role, type and site in that order, stopping at the first failure.
    pub async fn resolve_all(&self, spec: &DeviceSpec) -> Result<ResolvedIds> {
        let role = self.resolve(Category::Role, &spec.role).await?;
        debug!(role_id = role, "found role");

        let device_type = self.resolve(Category::Type, &spec.device_type).await?;
        debug!(type_id = device_type, "found type");

        let site = self.resolve(Category::Site, &spec.site).await?;
        debug!(site_id = site, "found site");

        Ok(ResolvedIds {
            role,
            device_type,
            site,
        })
    }
}
