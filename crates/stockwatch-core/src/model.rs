//! Inventory data model
//!
//! - [`Resource`]: one inventory item and its per-location status records
//! - [`Status`]: the raw upstream status token, compared verbatim across cycles
//! - [`Availability`]: the semantic reading of a [`Status`]
//! - [`WatchRule`]: a user filter plus the transition history it has accumulated

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::TransitionLog;

/// Status reported by the source when a location carries no status at all
pub const UNKNOWN_STATUS: &str = "unknown";

/// Raw status token for one location (`"unavailable"`, `"available"`, `"120H"`, ...)
///
/// Equality is plain string equality: a change of token is a transition even
/// when both tokens read as "available".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(String);

/// Semantic availability derived from a [`Status`] token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// `"unavailable"`, empty, or `"unknown"`
    Unavailable,
    /// Available now, or any token that is not otherwise recognised
    Available,
    /// Available within the given number of hours (`"72H"`, `"1H-low"`)
    LeadTime(u32),
}

impl Status {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token used when the upstream payload omits a status
    pub fn unknown() -> Self {
        Self(UNKNOWN_STATUS.to_string())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the token
    ///
    /// Only the literal `"unavailable"` is matched case-sensitively; `"unknown"`
    /// is matched case-insensitively.
    pub fn availability(&self) -> Availability {
        let token = self.0.as_str();
        if token == "unavailable" || token.is_empty() || token.eq_ignore_ascii_case(UNKNOWN_STATUS) {
            return Availability::Unavailable;
        }

        match lead_time_hours(token) {
            Some(hours) => Availability::LeadTime(hours),
            None => Availability::Available,
        }
    }

    /// Whether the location can be ordered now or within a lead time
    ///
    /// Lead-time tokens count as available; callers that care about the
    /// difference must look at [`Status::availability`].
    pub fn is_available(&self) -> bool {
        is_available(self)
    }

    /// Human readable label for messages
    pub fn describe(&self) -> String {
        match self.availability() {
            Availability::Unavailable => "unavailable".to_string(),
            Availability::LeadTime(hours) => format!("within {} hours", hours),
            Availability::Available if self.0.eq_ignore_ascii_case("available") => {
                "available now".to_string()
            }
            Availability::Available => self.0.clone(),
        }
    }
}

/// Availability predicate over a status token
pub fn is_available(status: &Status) -> bool {
    !matches!(status.availability(), Availability::Unavailable)
}

/// Parse a leading hour count followed by `H` (`"120H"`, `"1H-high"`)
fn lead_time_hours(token: &str) -> Option<u32> {
    let digits_end = token
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)?;

    if digits_end == 0 {
        return None;
    }

    let (digits, rest) = token.split_at(digits_end);
    if rest.starts_with('H') || rest.starts_with('h') {
        digits.parse().ok()
    } else {
        None
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::unknown()
    }
}

impl From<&str> for Status {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Status {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Status of a resource at one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    /// Location identifier (e.g. "gra1")
    #[serde(default, alias = "datacenter")]
    pub location: String,
    /// Raw status token, `"unknown"` when absent
    #[serde(default, alias = "availability")]
    pub status: Status,
}

impl AvailabilityRecord {
    /// Create a record
    pub fn new(location: impl Into<String>, status: impl Into<Status>) -> Self {
        Self {
            location: location.into(),
            status: status.into(),
        }
    }
}

/// An inventory item as seen in one fetch cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Fully-qualified name, the identity across cycles
    ///
    /// May deserialize empty; sources fill in a positional name.
    #[serde(default, alias = "fqn")]
    pub identifier: String,
    #[serde(default, alias = "planCode")]
    pub plan_code: String,
    /// Model name shown to users
    #[serde(default, alias = "server")]
    pub display_name: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub storage: String,
    #[serde(default, alias = "systemStorage")]
    pub system_storage: String,
    #[serde(default)]
    pub gpu: String,
    /// Ordered per-location status
    #[serde(default, alias = "datacenters")]
    pub locations: Vec<AvailabilityRecord>,
}

impl Resource {
    /// Create a resource with `N/A` hardware descriptors
    pub fn new(identifier: impl Into<String>, plan_code: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            display_name: identifier.clone(),
            identifier,
            plan_code: plan_code.into(),
            memory: "N/A".to_string(),
            storage: "N/A".to_string(),
            system_storage: "N/A".to_string(),
            gpu: "N/A".to_string(),
            locations: Vec::new(),
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set memory and storage descriptors
    pub fn with_hardware(
        mut self,
        memory: impl Into<String>,
        storage: impl Into<String>,
        system_storage: impl Into<String>,
    ) -> Self {
        self.memory = memory.into();
        self.storage = storage.into();
        self.system_storage = system_storage.into();
        self
    }

    /// Append a location status
    pub fn with_location(mut self, location: impl Into<String>, status: impl Into<Status>) -> Self {
        self.locations.push(AvailabilityRecord::new(location, status));
        self
    }

    /// Whether any location is available
    pub fn any_available(&self) -> bool {
        self.locations.iter().any(|record| record.status.is_available())
    }
}

/// Filters selecting which (resource, location) pairs a rule watches
///
/// An absent or empty filter matches everything on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFilters {
    /// Exact, case-sensitive resource identifier
    #[serde(default, alias = "fqn", skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Case-insensitive substring of the location name
    #[serde(default, alias = "datacenter", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RuleFilters {
    /// The identifier filter, if set and non-empty
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref().filter(|s| !s.is_empty())
    }

    /// The location filter, if set and non-empty
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether no filter dimension is set
    pub fn is_empty(&self) -> bool {
        self.identifier().is_none() && self.location().is_none()
    }
}

/// A user-defined watch rule
///
/// Rules are created and deleted by the configuration layer. The engine only
/// updates `history` and `last_notification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRule {
    pub id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, alias = "productFilters")]
    pub filters: RuleFilters,

    /// Captured for the configuration layer; detection does not consult it
    #[serde(default = "default_enabled", alias = "notifyOnAvailability")]
    pub notify_on_availability: bool,

    /// History key -> transitions observed for this rule
    ///
    /// See [`WatchRule::history_key`] for the key format.
    #[serde(default, alias = "statusHistory")]
    pub history: BTreeMap<String, TransitionLog>,

    #[serde(default, alias = "lastNotification", skip_serializing_if = "Option::is_none")]
    pub last_notification: Option<DateTime<Utc>>,
}

impl WatchRule {
    /// Create an enabled rule with no filters
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            filters: RuleFilters::default(),
            notify_on_availability: true,
            history: BTreeMap::new(),
            last_notification: None,
        }
    }

    /// Only watch the resource with this identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.filters.identifier = Some(identifier.into());
        self
    }

    /// Only watch locations whose name contains this substring
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.filters.location = Some(location.into());
        self
    }

    /// Enable or disable the rule
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the rule narrows to specific locations
    pub fn is_location_scoped(&self) -> bool {
        self.filters.location().is_some()
    }

    /// Key under which this rule tracks one resource at one location
    ///
    /// A rule pinned to an identifier sees one resource, so the location name
    /// alone is the key. Any other rule can match several resources at the
    /// same location and keys by `"<identifier>/<location>"`.
    pub fn history_key(&self, identifier: &str, location: &str) -> String {
        match self.filters.identifier() {
            Some(_) => location.to_string(),
            None => format!("{}/{}", identifier, location),
        }
    }
}

fn default_enabled() -> bool {
    true
}
