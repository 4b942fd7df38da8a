//! Core traits for the stockwatch system
//!
//! This module defines the collaborator interfaces the engine depends on.
//!
//! - [`InventorySource`]: Fetch the current inventory snapshot
//! - [`NotificationChannel`]: Deliver a message to an outbound channel
//! - [`HistoryStore`]: Bounded per-(rule, history key) transition history

pub mod history_store;
pub mod inventory_source;
pub mod notification_channel;

pub use history_store::{HistoryStore, HistoryStoreFactory};
pub use inventory_source::{InventorySource, InventorySourceFactory};
pub use notification_channel::{NotificationChannel, NotificationChannelFactory};
