// # stockwatch-core
//
// Core library for the stockwatch availability monitor.
//
// ## Architecture Overview
//
// This library provides the detection-and-dispatch engine:
// - **InventorySource**: Trait for fetching the current inventory snapshot
// - **NotificationChannel**: Trait for delivering a message to an outbound channel
// - **HistoryStore**: Trait for the bounded per-(rule, history key) transition log
// - **SnapshotFetcher**: Wraps a source with last-good and placeholder fallbacks
// - **Detector**: Decides whether an observation is a transition
// - **Notifier**: Formats and sends transition messages
// - **Monitor**: Owns timing, serializes check cycles, exposes start/stop/status
// - **ComponentRegistry**: Plugin-based registry for sources, channels and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Detection logic is separate from transports
// 2. **Library-First**: All core functionality can be used as a library
// 3. **No Globals**: One `Monitor` instance owns config, snapshot cache and timer
// 4. **Non-Fatal Cycles**: Fetch and delivery failures degrade, never stop the loop

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod matcher;
pub mod model;
pub mod notify;
pub mod registry;
pub mod source;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ChannelConfig, EngineConfig, HistoryStoreConfig, MonitorConfig, SourceConfig};
pub use engine::{CycleReport, Monitor, MonitorEvent, MonitorStatus};
pub use error::{Error, Result};
pub use history::{HISTORY_LIMIT, RuleHistory, TransitionLog, TransitionRecord};
pub use model::{
    Availability, AvailabilityRecord, Resource, RuleFilters, Status, WatchRule, is_available,
};
pub use notify::{DeliveryOutcome, Notification, Notifier, StatusChange, compose_message};
pub use registry::ComponentRegistry;
pub use source::{
    Snapshot, SnapshotFetcher, SnapshotOrigin, StaticInventorySource, normalize_payload,
};
pub use state::{FileHistoryStore, MemoryHistoryStore};
pub use traits::{
    HistoryStore, HistoryStoreFactory, InventorySource, InventorySourceFactory,
    NotificationChannel, NotificationChannelFactory,
};
