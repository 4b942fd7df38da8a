// # Memory History Store
//
// In-memory implementation of HistoryStore.
//
// ## Purpose
//
// Keeps transition history for the lifetime of the process. Useful when the
// configuration layer owns persistence (it reads the history back through
// `Monitor::rules()`), and for tests.
//
// ## Restart Behavior
//
// - All history is lost on restart unless it is seeded back from configuration
// - Without seeding, the first cycle after a restart records every key silently

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::Error;
use crate::history::{RuleHistory, TransitionRecord};
use crate::traits::{HistoryStore, HistoryStoreFactory};

/// In-memory history store implementation
///
/// # Example
///
/// ```rust,no_run
/// use stockwatch_core::state::MemoryHistoryStore;
/// use stockwatch_core::{HistoryStore, TransitionRecord};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryHistoryStore::new();
///
///     let record = TransitionRecord::new("gra1", "available", chrono::Utc::now());
///     assert!(store.append("rule-1", "gra1", record).await?);
///
///     let last = store.last_transition("rule-1", "gra1").await?;
///     assert_eq!(last.unwrap().status.as_str(), "available");
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<HashMap<String, RuleHistory>>>,
}

impl MemoryHistoryStore {
    /// Create a new empty memory history store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules with stored history
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Clear all history
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn last_transition(
        &self,
        rule_id: &str,
        key: &str,
    ) -> Result<Option<TransitionRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(rule_id)
            .and_then(|history| history.last(key))
            .cloned())
    }

    async fn history(&self, rule_id: &str, key: &str) -> Result<Vec<TransitionRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(rule_id)
            .and_then(|history| history.locations.get(key))
            .map(|log| log.to_vec())
            .unwrap_or_default())
    }

    async fn append(
        &self,
        rule_id: &str,
        key: &str,
        record: TransitionRecord,
    ) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard
            .entry(rule_id.to_string())
            .or_default()
            .record(key, record))
    }

    async fn rule_history(&self, rule_id: &str) -> Result<Option<RuleHistory>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(rule_id).cloned())
    }

    async fn set_last_notification(&self, rule_id: &str, at: DateTime<Utc>) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.entry(rule_id.to_string()).or_default().last_notification = Some(at);
        Ok(())
    }

    async fn seed(&self, rule_id: &str, history: RuleHistory) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(rule_id) {
            return Ok(false);
        }
        guard.insert(rule_id.to_string(), history);
        Ok(true)
    }

    async fn remove_rule(&self, rule_id: &str) -> Result<(), Error> {
        self.inner.write().await.remove(rule_id);
        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}

/// Factory for `{"type": "memory"}`
pub struct MemoryHistoryStoreFactory;

#[async_trait]
impl HistoryStoreFactory for MemoryHistoryStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn HistoryStore>, Error> {
        Ok(Box::new(MemoryHistoryStore::new()))
    }
}
