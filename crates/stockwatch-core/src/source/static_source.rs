//! In-memory inventory source
//!
//! Serves a fixed resource list that can be edited between cycles. Used for
//! dry runs, demos and tests where the real endpoint should not be called.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::SourceConfig;
use crate::model::{Resource, Status};
use crate::traits::{InventorySource, InventorySourceFactory};
use crate::{Error, Result};

/// Inventory source backed by an in-memory list
///
/// Clones share the same list, so a handle kept outside the monitor can flip
/// statuses the monitor will see on its next cycle.
#[derive(Debug, Clone, Default)]
pub struct StaticInventorySource {
    resources: Arc<RwLock<Vec<Resource>>>,
}

impl StaticInventorySource {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources: Arc::new(RwLock::new(resources)),
        }
    }

    /// Two sample products with mixed availability
    pub fn demo() -> Self {
        Self::new(vec![
            Resource::new("24sk10.ram-32g-ecc-2133.softraid-2x2000sa", "24sk10-sgp")
                .with_display_name("SK Server 24sk10-sgp")
                .with_hardware("32GB-ECC-2133", "2x480GB SSD SoftRAID", "2x480GB SSD")
                .with_location("gra1", "available")
                .with_location("bhs1", "unavailable")
                .with_location("sgp1", "120H"),
            Resource::new("test-product-2", "test-sk-2")
                .with_display_name("Test SK Server 2")
                .with_hardware("256GB", "4x1.92TB NVMe", "2x480GB SSD")
                .with_location("gra1", "unavailable")
                .with_location("bhs1", "available")
                .with_location("sgp1", "unavailable"),
        ])
    }

    /// Set the status of the first matching location
    ///
    /// `location` is matched as a case-insensitive substring. Returns the
    /// previous status, or `None` if nothing matched.
    pub async fn set_status(
        &self,
        identifier: &str,
        location: &str,
        status: impl Into<Status>,
    ) -> Option<Status> {
        let needle = location.to_lowercase();
        let mut resources = self.resources.write().await;

        let record = resources
            .iter_mut()
            .filter(|resource| resource.identifier == identifier)
            .flat_map(|resource| resource.locations.iter_mut())
            .find(|record| record.location.to_lowercase().contains(&needle))?;

        Some(std::mem::replace(&mut record.status, status.into()))
    }

    /// Replace the whole list
    pub async fn replace(&self, resources: Vec<Resource>) {
        *self.resources.write().await = resources;
    }

    pub async fn resources(&self) -> Vec<Resource> {
        self.resources.read().await.clone()
    }
}

#[async_trait]
impl InventorySource for StaticInventorySource {
    async fn fetch(&self) -> Result<Vec<Resource>> {
        Ok(self.resources.read().await.clone())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// Factory for [`SourceConfig::Static`]
pub struct StaticSourceFactory;

impl InventorySourceFactory for StaticSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn InventorySource>> {
        match config {
            SourceConfig::Static { resources } if resources.is_empty() => {
                Ok(Box::new(StaticInventorySource::demo()))
            }
            SourceConfig::Static { resources } => {
                let resources = resources
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(|(index, resource)| fill_defaults(index, resource))
                    .collect();
                Ok(Box::new(StaticInventorySource::new(resources)))
            }
            other => Err(Error::config(format!(
                "Static source factory cannot build a '{}' source",
                other.type_name()
            ))),
        }
    }
}

/// Default blank fields of a configured resource the way live payloads are
/// normalized (see [`normalize_payload`](super::normalize_payload))
fn fill_defaults(index: usize, mut resource: Resource) -> Resource {
    let positional = format!("product-{}", index);
    for (field, default) in [
        (&mut resource.identifier, positional.as_str()),
        (&mut resource.plan_code, positional.as_str()),
        (&mut resource.display_name, positional.as_str()),
        (&mut resource.memory, "N/A"),
        (&mut resource.storage, "N/A"),
        (&mut resource.system_storage, "N/A"),
        (&mut resource.gpu, "N/A"),
    ] {
        if field.is_empty() {
            *field = default.to_string();
        }
    }

    for record in &mut resource.locations {
        if record.status.as_str().is_empty() {
            record.status = Status::unknown();
        }
    }
    resource
}
