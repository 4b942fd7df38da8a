//! Inventory snapshot acquisition
//!
//! - [`SnapshotFetcher`]: wraps any source with last-good and placeholder fallback
//! - [`StaticInventorySource`]: in-memory source for dry runs and tests
//! - [`normalize_payload`]: shared payload normalization for HTTP sources

pub mod fetcher;
pub mod static_source;

pub use fetcher::{Snapshot, SnapshotFetcher, SnapshotOrigin, normalize_payload, placeholder_snapshot};
pub use static_source::{StaticInventorySource, StaticSourceFactory};
