//! Bounded transition history
//!
//! Every (rule, history key) pair owns a [`TransitionLog`]: an append-only FIFO of
//! at most [`HISTORY_LIMIT`] records in which consecutive records never carry
//! the same status and timestamps never go backwards. History keys come from
//! [`WatchRule::history_key`].

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Status, WatchRule};

/// Maximum number of records kept per (rule, history key) pair
pub const HISTORY_LIMIT: usize = 10;

/// One observed status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    #[serde(alias = "datacenter")]
    pub location: String,
    #[serde(alias = "availability")]
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    /// Create a record
    pub fn new(location: impl Into<String>, status: impl Into<Status>, timestamp: DateTime<Utc>) -> Self {
        Self {
            location: location.into(),
            status: status.into(),
            timestamp,
        }
    }
}

/// Bounded FIFO of transitions for one key
///
/// Oldest records are evicted first once the log is full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TransitionRecord>", into = "Vec<TransitionRecord>")]
pub struct TransitionLog {
    records: VecDeque<TransitionRecord>,
}

impl TransitionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent record
    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.back()
    }

    /// Append a record if its status differs from the last one
    ///
    /// A timestamp earlier than the last record is raised to the last
    /// record's timestamp. Returns whether the record was stored.
    pub fn record(&mut self, mut record: TransitionRecord) -> bool {
        if let Some(last) = self.records.back() {
            if last.status == record.status {
                return false;
            }
            if record.timestamp < last.timestamp {
                record.timestamp = last.timestamp;
            }
        }

        self.records.push_back(record);
        while self.records.len() > HISTORY_LIMIT {
            self.records.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter()
    }

    /// Records from oldest to newest, cloned
    pub fn to_vec(&self) -> Vec<TransitionRecord> {
        self.records.iter().cloned().collect()
    }
}

impl From<Vec<TransitionRecord>> for TransitionLog {
    fn from(records: Vec<TransitionRecord>) -> Self {
        // Replaying through `record` keeps persisted logs within the invariants
        let mut log = Self::new();
        for record in records {
            log.record(record);
        }
        log
    }
}

impl From<TransitionLog> for Vec<TransitionRecord> {
    fn from(log: TransitionLog) -> Self {
        log.records.into_iter().collect()
    }
}

/// Everything the engine tracks for one rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleHistory {
    /// History key -> transition log
    #[serde(default, alias = "statusHistory")]
    pub locations: BTreeMap<String, TransitionLog>,

    /// When the rule last produced a notification attempt
    #[serde(default, alias = "lastNotification", skip_serializing_if = "Option::is_none")]
    pub last_notification: Option<DateTime<Utc>>,
}

impl RuleHistory {
    /// The most recent record for a key
    pub fn last(&self, key: &str) -> Option<&TransitionRecord> {
        self.locations.get(key).and_then(TransitionLog::last)
    }

    /// Append to a key's log (see [`TransitionLog::record`])
    pub fn record(&mut self, key: &str, record: TransitionRecord) -> bool {
        self.locations.entry(key.to_string()).or_default().record(record)
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.last_notification.is_none()
    }
}

impl From<&WatchRule> for RuleHistory {
    fn from(rule: &WatchRule) -> Self {
        Self {
            locations: rule.history.clone(),
            last_notification: rule.last_notification,
        }
    }
}
