//! Snapshot fetching with fallback
//!
//! [`SnapshotFetcher`] wraps an [`InventorySource`] so a cycle always has a
//! snapshot to diff. On failure it serves, in order:
//!
//! 1. the last non-empty live snapshot held in memory
//! 2. a built-in placeholder snapshot (unless disabled)
//!
//! Degraded fetches are counted and logged so operators can tell "no change"
//! apart from "upstream down".

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::model::{AvailabilityRecord, Resource, Status};
use crate::traits::InventorySource;

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    /// Fresh from the source
    Live,
    /// Last good live snapshot, served because the source failed
    Cached,
    /// Built-in placeholder, served because the source failed and nothing was cached
    Placeholder,
}

impl fmt::Display for SnapshotOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotOrigin::Live => f.write_str("live"),
            SnapshotOrigin::Cached => f.write_str("cached"),
            SnapshotOrigin::Placeholder => f.write_str("placeholder"),
        }
    }
}

/// Resources for one cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub resources: Vec<Resource>,
    pub origin: SnapshotOrigin,
    pub fetched_at: DateTime<Utc>,
    /// Source error that forced a fallback, if any
    pub degraded: Option<String>,
}

impl Snapshot {
    pub fn is_degraded(&self) -> bool {
        self.origin != SnapshotOrigin::Live
    }
}

/// Fetches snapshots from a source and falls back on failure
pub struct SnapshotFetcher {
    source: Arc<dyn InventorySource>,
    last_good: RwLock<Option<Vec<Resource>>>,
    placeholder: bool,
    degraded_fetches: AtomicU64,
}

impl SnapshotFetcher {
    /// Create a fetcher
    ///
    /// With `placeholder` disabled a failed fetch with an empty cache yields
    /// no snapshot and the cycle is skipped.
    pub fn new(source: Arc<dyn InventorySource>, placeholder: bool) -> Self {
        Self {
            source,
            last_good: RwLock::new(None),
            placeholder,
            degraded_fetches: AtomicU64::new(0),
        }
    }

    /// Fetch the current snapshot
    ///
    /// Never fails: source errors are absorbed into the fallback chain.
    pub async fn fetch(&self) -> Option<Snapshot> {
        let fetched_at = Utc::now();

        let error = match self.source.fetch().await {
            Ok(resources) => {
                debug!(
                    "Fetched {} resources from {}",
                    resources.len(),
                    self.source.source_name()
                );
                if !resources.is_empty() {
                    *self.last_good.write().await = Some(resources.clone());
                }
                return Some(Snapshot {
                    resources,
                    origin: SnapshotOrigin::Live,
                    fetched_at,
                    degraded: None,
                });
            }
            Err(e) => e.to_string(),
        };

        self.degraded_fetches.fetch_add(1, Ordering::Relaxed);

        let cached = self
            .last_good
            .read()
            .await
            .clone()
            .filter(|resources| !resources.is_empty());

        if let Some(resources) = cached {
            warn!(
                source = self.source.source_name(),
                "Fetch failed, serving {} cached resources: {}",
                resources.len(),
                error
            );
            return Some(Snapshot {
                resources,
                origin: SnapshotOrigin::Cached,
                fetched_at,
                degraded: Some(error),
            });
        }

        if self.placeholder {
            warn!(
                source = self.source.source_name(),
                "Fetch failed with nothing cached, serving placeholder snapshot: {}", error
            );
            return Some(Snapshot {
                resources: placeholder_snapshot(),
                origin: SnapshotOrigin::Placeholder,
                fetched_at,
                degraded: Some(error),
            });
        }

        warn!(
            source = self.source.source_name(),
            "Fetch failed with nothing cached and placeholder disabled: {}", error
        );
        None
    }

    /// Number of fetches that fell back since creation
    pub fn degraded_fetches(&self) -> u64 {
        self.degraded_fetches.load(Ordering::Relaxed)
    }

    /// Name of the wrapped source
    pub fn source_name(&self) -> &'static str {
        self.source.source_name()
    }
}

/// Built-in snapshot served when no live or cached data exists
pub fn placeholder_snapshot() -> Vec<Resource> {
    vec![
        Resource::new("baremetal_ab-2-14", "baremetal_ab-2-14")
            .with_display_name("AB-2-14")
            .with_hardware("32GB", "2x480GB SSD", "2x480GB SSD")
            .with_location("bhs1", "available")
            .with_location("gra1", "unavailable")
            .with_location("sbg1", "available"),
        Resource::new("baremetal_ab-2-16", "baremetal_ab-2-16")
            .with_display_name("AB-2-16")
            .with_hardware("64GB", "2x480GB SSD", "2x480GB SSD")
            .with_location("bhs1", "unavailable")
            .with_location("gra1", "available")
            .with_location("sbg1", "unavailable"),
    ]
}

/// Normalize an upstream availability payload
///
/// A payload that is not an array normalizes to an empty list. Missing or
/// empty fields are defaulted: identifiers to `product-<index>`, hardware
/// descriptors to `N/A`, location names to `""` and statuses to `unknown`.
pub fn normalize_payload(payload: Value) -> Vec<Resource> {
    let Value::Array(items) = payload else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| normalize_item(index, item))
        .collect()
}

fn normalize_item(index: usize, item: &Value) -> Resource {
    let positional = format!("product-{}", index);
    let text = |key: &str, default: &str| -> String {
        non_empty_str(item, key).unwrap_or(default).to_string()
    };

    let locations = item
        .get("datacenters")
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .map(|record| {
                    AvailabilityRecord::new(
                        non_empty_str(record, "datacenter").unwrap_or(""),
                        non_empty_str(record, "availability")
                            .map(Status::new)
                            .unwrap_or_else(Status::unknown),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    Resource {
        identifier: text("fqn", &positional),
        plan_code: text("planCode", &positional),
        display_name: text("server", &positional),
        memory: text("memory", "N/A"),
        storage: text("storage", "N/A"),
        system_storage: text("systemStorage", "N/A"),
        gpu: text("gpu", "N/A"),
        locations,
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
