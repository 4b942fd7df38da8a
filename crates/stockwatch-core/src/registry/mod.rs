//! Plugin-based component registry
//!
//! The registry lets inventory sources, notification channels and history
//! stores be registered at runtime, so the daemon builds components from
//! configuration without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockwatch_core::ComponentRegistry;
//! use stockwatch_core::config::SourceConfig;
//!
//! let registry = ComponentRegistry::with_builtins();
//! stockwatch_source_ovh::register(&registry);
//!
//! let source = registry.create_source(&SourceConfig::default())?;
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! // In stockwatch-notify-telegram
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_channel("telegram", Box::new(TelegramChannelFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{ChannelConfig, HistoryStoreConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::source::StaticSourceFactory;
use crate::state::{FileHistoryStoreFactory, MemoryHistoryStoreFactory};
use crate::traits::{HistoryStore, InventorySource, NotificationChannel};
use crate::traits::{HistoryStoreFactory, InventorySourceFactory, NotificationChannelFactory};

/// Registry mapping type names to component factories
///
/// ## Thread Safety
///
/// Interior mutability with `RwLock` allows concurrent reads and exclusive
/// writes. A poisoned lock is recovered: factories are only inserted whole,
/// so a panic elsewhere cannot leave a map half-updated.
#[derive(Default)]
pub struct ComponentRegistry {
    sources: RwLock<HashMap<String, Box<dyn InventorySourceFactory>>>,
    channels: RwLock<HashMap<String, Box<dyn NotificationChannelFactory>>>,
    stores: RwLock<HashMap<String, Arc<dyn HistoryStoreFactory>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the components this crate provides:
    /// the `static` source and the `memory` and `file` history stores
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_source("static", Box::new(StaticSourceFactory));
        registry.register_store("memory", Box::new(MemoryHistoryStoreFactory));
        registry.register_store("file", Box::new(FileHistoryStoreFactory));
        registry
    }

    /// Register an inventory source factory
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn InventorySourceFactory>) {
        write(&self.sources).insert(name.into(), factory);
    }

    /// Register a notification channel factory
    pub fn register_channel(
        &self,
        name: impl Into<String>,
        factory: Box<dyn NotificationChannelFactory>,
    ) {
        write(&self.channels).insert(name.into(), factory);
    }

    /// Register a history store factory
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn HistoryStoreFactory>) {
        write(&self.stores).insert(name.into(), Arc::from(factory));
    }

    /// Create an inventory source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn InventorySource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn InventorySource>> {
        config.validate()?;
        let source_type = config.type_name();
        let sources = read(&self.sources);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a notification channel from configuration
    pub fn create_channel(&self, config: &ChannelConfig) -> Result<Box<dyn NotificationChannel>> {
        let channels = read(&self.channels);

        let factory = channels
            .get(config.kind.as_str())
            .ok_or_else(|| Error::config(format!("Unknown channel type: {}", config.kind)))?;

        factory.create(config)
    }

    /// Create a history store from configuration
    pub async fn create_store(&self, config: &HistoryStoreConfig) -> Result<Box<dyn HistoryStore>> {
        let store_type = config.type_name();

        let factory = read(&self.stores)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown history store type: {}", store_type)))?;

        // Lock is released above; factories may perform async I/O
        let config_json = match config {
            HistoryStoreConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        factory.create(&config_json).await
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        read(&self.sources).keys().cloned().collect()
    }

    /// List all registered channel types
    pub fn list_channels(&self) -> Vec<String> {
        read(&self.channels).keys().cloned().collect()
    }

    /// List all registered history store types
    pub fn list_stores(&self) -> Vec<String> {
        read(&self.stores).keys().cloned().collect()
    }

    pub fn has_source(&self, name: &str) -> bool {
        read(&self.sources).contains_key(name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        read(&self.channels).contains_key(name)
    }

    pub fn has_store(&self, name: &str) -> bool {
        read(&self.stores).contains_key(name)
    }
}
