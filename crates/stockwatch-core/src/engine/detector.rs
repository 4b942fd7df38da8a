//! Transition detection
//!
//! Per (rule, history key) pair the detector is a small state machine over the
//! raw status strings. It starts in an implicit "never seen" state, every edge
//! into a new status is recorded, and every edge except the one out of the
//! start state is worth a notification.

use chrono::{DateTime, Duration, Utc};

use crate::history::TransitionRecord;
use crate::model::Status;
use crate::traits::HistoryStore;
use crate::Result;

/// A recorded status change for one key
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The record this transition superseded, `None` on first observation
    pub previous: Option<TransitionRecord>,
    pub current: Status,
    /// Time since `previous`, formatted for messages
    pub elapsed: Option<String>,
}

impl Transition {
    /// First observations are recorded silently
    pub fn is_notifiable(&self) -> bool {
        self.previous.is_some()
    }

    pub fn previous_status(&self) -> Option<&Status> {
        self.previous.as_ref().map(|record| &record.status)
    }
}

/// Compare an observed status with the last record for its key
///
/// `key` selects the log (see [`WatchRule::history_key`]); `location` is the
/// name stored in the new record. Appends a record when the status changed
/// and returns the transition. Returns `None` when the status equals the last
/// recorded one.
///
/// [`WatchRule::history_key`]: crate::model::WatchRule::history_key
pub async fn observe(
    store: &dyn HistoryStore,
    rule_id: &str,
    key: &str,
    location: &str,
    status: &Status,
    now: DateTime<Utc>,
) -> Result<Option<Transition>> {
    let previous = store.last_transition(rule_id, key).await?;

    if previous.as_ref().is_some_and(|last| &last.status == status) {
        return Ok(None);
    }

    let stored = store
        .append(rule_id, key, TransitionRecord::new(location, status.clone(), now))
        .await?;
    if !stored {
        // Another writer recorded the same status in between
        return Ok(None);
    }

    let elapsed = previous
        .as_ref()
        .map(|last| format_elapsed(now.signed_duration_since(last.timestamp)));

    Ok(Some(Transition {
        previous,
        current: status.clone(),
        elapsed,
    }))
}

/// Coarse human readable duration
///
/// Shows at most two units and drops the smaller one when it is zero:
/// `45s`, `2m 5s`, `2h`, `1d 1h`. Negative durations read as `0s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.num_seconds().max(0);

    if seconds < 60 {
        return format!("{}s", seconds);
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return with_remainder(minutes, "m", seconds % 60, "s");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return with_remainder(hours, "h", minutes % 60, "m");
    }

    with_remainder(hours / 24, "d", hours % 24, "h")
}

fn with_remainder(major: i64, major_unit: &str, minor: i64, minor_unit: &str) -> String {
    if minor > 0 {
        format!("{}{} {}{}", major, major_unit, minor, minor_unit)
    } else {
        format!("{}{}", major, major_unit)
    }
}
