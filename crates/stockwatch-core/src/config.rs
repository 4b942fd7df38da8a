//! Configuration types for the stockwatch system
//!
//! This module defines all configuration structures used throughout the crate.
//! Field aliases accept the camelCase names used by the configuration UI's
//! JSON files, so an exported config can be loaded as-is.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Resource, WatchRule};

/// What the monitor watches and where it reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Outbound channel settings
    #[serde(default, alias = "telegramConfig")]
    pub channel: ChannelConfig,

    /// Seconds between check cycles
    #[serde(default = "default_check_interval_secs", alias = "checkIntervalSeconds")]
    pub check_interval_secs: u64,

    /// Watch rules, in evaluation order
    #[serde(default, alias = "watchConfigs")]
    pub rules: Vec<WatchRule>,
}

impl MonitorConfig {
    /// Create a configuration with defaults and no rules
    pub fn new(channel: ChannelConfig) -> Self {
        Self {
            channel,
            check_interval_secs: default_check_interval_secs(),
            rules: Vec::new(),
        }
    }

    /// Set the check interval
    pub fn with_interval(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: WatchRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate the configuration
    ///
    /// A rule without filters is accepted: it matches every resource and
    /// location, which is almost never intended, so it is logged.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval_secs == 0 {
            return Err(crate::Error::config("Check interval must be > 0"));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.is_empty() {
                return Err(crate::Error::config("Rule id cannot be empty"));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(crate::Error::config(format!("Duplicate rule id: {}", rule.id)));
            }
            if rule.filters.is_empty() {
                tracing::warn!("Rule {} has no filters and will match every location", rule.id);
            }
        }

        Ok(())
    }

    /// Number of enabled rules
    pub fn enabled_rules(&self) -> usize {
        self.rules.iter().filter(|rule| rule.enabled).count()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

fn default_check_interval_secs() -> u64 {
    60
}

/// Outbound channel configuration
///
/// `Debug` never prints the credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Registered channel type name
    #[serde(default = "default_channel_kind", rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub enabled: bool,

    /// Recipient (chat id for Telegram)
    #[serde(default, alias = "chatId")]
    pub destination: String,

    /// Secret (bot token for Telegram)
    #[serde(default, alias = "botToken")]
    pub credential: String,
}

impl ChannelConfig {
    /// An enabled Telegram channel
    pub fn telegram(chat_id: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            kind: default_channel_kind(),
            enabled: true,
            destination: chat_id.into(),
            credential: bot_token.into(),
        }
    }

    /// Whether notifications can be attempted at all
    pub fn is_deliverable(&self) -> bool {
        self.enabled && !self.destination.is_empty() && !self.credential.is_empty()
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kind: default_channel_kind(),
            enabled: false,
            destination: String::new(),
            credential: String::new(),
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("destination", &self.destination)
            .field("credential", &"<redacted>")
            .finish()
    }
}

fn default_channel_kind() -> String {
    "telegram".to_string()
}

/// Inventory source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// OVH dedicated-server availability endpoint
    Ovh {
        /// Endpoint URL
        #[serde(default = "default_ovh_url")]
        url: String,
    },

    /// In-memory resource list; an empty list uses the built-in demo products
    Static {
        #[serde(default)]
        resources: Vec<Resource>,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Ovh { url } => {
                if url.is_empty() {
                    return Err(crate::Error::config("OVH source URL cannot be empty"));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "OVH source URL must be http(s): {}",
                        url
                    )));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                Ok(())
            }
            SourceConfig::Static { .. } => Ok(()),
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Ovh { .. } => "ovh",
            SourceConfig::Static { .. } => "static",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Ovh {
            url: default_ovh_url(),
        }
    }
}

/// Public OVH availability endpoint
pub const DEFAULT_OVH_URL: &str =
    "https://eu.api.ovh.com/v1/dedicated/server/datacenter/availabilities";

fn default_ovh_url() -> String {
    DEFAULT_OVH_URL.to_string()
}

/// History store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryStoreConfig {
    /// File-based history store
    File {
        /// Path to the history file
        path: String,
    },

    /// In-memory history store (not persistent)
    #[default]
    Memory,

    /// Custom history store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl HistoryStoreConfig {
    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            HistoryStoreConfig::File { .. } => "file",
            HistoryStoreConfig::Memory => "memory",
            HistoryStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single notification delivery (in seconds)
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,

    /// Capacity of the monitor event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Serve the built-in placeholder snapshot when the source fails and
    /// nothing is cached. When disabled such cycles are skipped.
    #[serde(default = "default_placeholder_snapshot")]
    pub placeholder_snapshot: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.notify_timeout_secs == 0 {
            return Err(crate::Error::config("Notification timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_timeout_secs: default_notify_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            placeholder_snapshot: default_placeholder_snapshot(),
        }
    }
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_placeholder_snapshot() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_original_config_layout() {
        let json = serde_json::json!({
            "telegramConfig": { "enabled": true, "botToken": "123:abc", "chatId": "-100" },
            "checkIntervalSeconds": 30,
            "watchConfigs": [
                {
                    "id": "w1",
                    "enabled": true,
                    "productFilters": { "fqn": "24sk10" },
                    "notifyOnAvailability": true,
                    "statusHistory": {}
                }
            ]
        });

        let config: MonitorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.channel.kind, "telegram");
        assert_eq!(config.channel.destination, "-100");
        assert!(config.channel.is_deliverable());
        assert_eq!(config.rules.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_duplicate_ids() {
        let channel = ChannelConfig::telegram("1", "t");

        let zero = MonitorConfig::new(channel.clone()).with_interval(0);
        assert!(zero.validate().is_err());

        let dup = MonitorConfig::new(channel.clone())
            .with_rule(WatchRule::new("a"))
            .with_rule(WatchRule::new("a"));
        assert!(dup.validate().is_err());

        let empty_id = MonitorConfig::new(channel).with_rule(WatchRule::new(""));
        assert!(empty_id.validate().is_err());
    }

    #[test]
    fn test_filterless_rule_is_tolerated() {
        let config = MonitorConfig::new(ChannelConfig::default()).with_rule(WatchRule::new("all"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_debug_redacts_credential() {
        let channel = ChannelConfig::telegram("42", "super-secret-token");
        let debug = format!("{:?}", channel);
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_source_config_defaults() {
        let source: SourceConfig = serde_json::from_value(serde_json::json!({ "type": "ovh" })).unwrap();
        assert_eq!(source.type_name(), "ovh");
        assert!(source.validate().is_ok());

        let bad = SourceConfig::Ovh { url: "ftp://x".to_string() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_engine_config_defaults() {
        let engine: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(engine.notify_timeout_secs, 10);
        assert_eq!(engine.event_channel_capacity, 1000);
        assert!(engine.placeholder_snapshot);
    }
}
