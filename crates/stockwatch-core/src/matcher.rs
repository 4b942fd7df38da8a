//! Rule matching
//!
//! A rule selects (resource, location) pairs through two optional filters:
//! an exact identifier and a case-insensitive location substring. A missing
//! filter matches everything on its dimension, so a rule without filters
//! matches every pair.

use crate::model::{Resource, WatchRule};

/// Whether the resource passes the rule's identifier filter
pub fn matches_resource(rule: &WatchRule, resource: &Resource) -> bool {
    match rule.filters.identifier() {
        Some(identifier) => resource.identifier == identifier,
        None => true,
    }
}

/// Whether the location name passes the rule's location filter
pub fn matches_location(rule: &WatchRule, location: &str) -> bool {
    match rule.filters.location() {
        Some(filter) => location.to_lowercase().contains(&filter.to_lowercase()),
        None => true,
    }
}

/// Whether the (resource, location) pair is in scope for the rule
pub fn matches(rule: &WatchRule, resource: &Resource, location: &str) -> bool {
    matches_resource(rule, resource) && matches_location(rule, location)
}
