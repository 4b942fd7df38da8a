// # Inventory Source Trait
//
// Defines the interface for fetching the current inventory snapshot.
//
// ## Implementations
//
// - OVH availability endpoint: `stockwatch-source-ovh` crate
// - In-memory list: `StaticInventorySource` in this crate
//
// ## Usage
//
// ```rust,ignore
// use stockwatch_core::InventorySource;
//
// #[tokio::main]
// async fn main() -> stockwatch_core::Result<()> {
//     let source = /* InventorySource implementation */;
//
//     let resources = source.fetch().await?;
//     println!("{} resources", resources.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::Resource;

/// Trait for inventory source implementations
///
/// A source performs one request per [`fetch`](InventorySource::fetch) call
/// and returns the normalized resource list in upstream order.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to its own endpoint
/// - ✅ Parse and normalize the upstream payload
///
/// ## Forbidden Capabilities
/// - ❌ Retry, back off or cache (the `SnapshotFetcher` owns fallback)
/// - ❌ Spawn tasks or polling loops (the `Monitor` owns timing)
/// - ❌ Panic on malformed payloads
///
/// Transport errors, non-success responses and non-JSON bodies must be
/// returned as `Err`, never as an empty list.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch the current inventory
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Resource>)`: The normalized snapshot
    /// - `Err(Error)`: Transport or payload failure
    async fn fetch(&self) -> Result<Vec<Resource>, crate::Error>;

    /// Get the source name (for logging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing inventory sources from configuration
pub trait InventorySourceFactory: Send + Sync {
    /// Create an InventorySource instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn InventorySource>, crate::Error>;
}
