// # History Store Trait
//
// Defines the interface for the bounded transition history.
//
// ## Purpose
//
// The history store is the detector's memory. For every (rule, history key)
// pair it holds the last few observed status changes, which is what lets a
// cycle decide whether the status it just saw is new. History keys are built
// by `WatchRule::history_key`; the store treats them as opaque strings.
//
// ## Implementations
//
// - Memory: history lives with the running process
// - File: JSON file shared across restarts
//
// ## Usage
//
// ```rust,ignore
// use stockwatch_core::{HistoryStore, TransitionRecord, WatchRule};
//
// #[tokio::main]
// async fn main() -> stockwatch_core::Result<()> {
//     let store = /* HistoryStore implementation */;
//     let rule = WatchRule::new("rule-1").with_location("gra");
//
//     let key = rule.history_key("24sk10", "gra1");
//     let last = store.last_transition(&rule.id, &key).await?;
//     let stored = store
//         .append(&rule.id, &key, TransitionRecord::new("gra1", "available", chrono::Utc::now()))
//         .await?;
//
//     store.flush().await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::history::{RuleHistory, TransitionRecord};

/// Trait for history store implementations
///
/// Implementations must keep every per-key log within the invariants of
/// [`TransitionLog`](crate::history::TransitionLog): at most
/// [`HISTORY_LIMIT`](crate::history::HISTORY_LIMIT) records, no two adjacent
/// records with the same status, non-decreasing timestamps.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Buffer writes in memory until `flush()`
///
/// ## Forbidden Capabilities
/// - ❌ Decide whether an observation is a transition (owned by the detector)
/// - ❌ Spawn background flush tasks (the `Monitor` flushes after each cycle)
///
/// ## Deployment
///
/// Exactly one monitor instance may use a persisted store at a time. There is
/// no cross-process locking.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Get the most recent record for a key
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: The last recorded transition
    /// - `Ok(None)`: The key has never been observed
    /// - `Err(Error)`: Storage error
    async fn last_transition(
        &self,
        rule_id: &str,
        key: &str,
    ) -> Result<Option<TransitionRecord>, crate::Error>;

    /// Get all records for a key, oldest first
    async fn history(
        &self,
        rule_id: &str,
        key: &str,
    ) -> Result<Vec<TransitionRecord>, crate::Error>;

    /// Append a record under `(rule_id, key)`
    ///
    /// The record keeps its own location name; `key` only selects the log.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The record was stored
    /// - `Ok(false)`: The status equals the last record and nothing changed
    /// - `Err(Error)`: Storage error
    async fn append(
        &self,
        rule_id: &str,
        key: &str,
        record: TransitionRecord,
    ) -> Result<bool, crate::Error>;

    /// Get everything stored for a rule
    async fn rule_history(&self, rule_id: &str) -> Result<Option<RuleHistory>, crate::Error>;

    /// Record when the rule last produced a notification attempt
    async fn set_last_notification(
        &self,
        rule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), crate::Error>;

    /// Install history carried by the configuration layer
    ///
    /// Only applies when the store holds nothing for the rule, so history the
    /// store already owns always wins over a stale copy in configuration.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the history was installed.
    async fn seed(&self, rule_id: &str, history: RuleHistory) -> Result<bool, crate::Error>;

    /// Drop everything stored for a rule (no-op if absent)
    async fn remove_rule(&self, rule_id: &str) -> Result<(), crate::Error>;

    /// List all rule ids in the store
    async fn list_rules(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing history stores from configuration
#[async_trait]
pub trait HistoryStoreFactory: Send + Sync {
    /// Create a HistoryStore instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Serialized [`HistoryStoreConfig`](crate::config::HistoryStoreConfig)
    async fn create(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn HistoryStore>, crate::Error>;
}
