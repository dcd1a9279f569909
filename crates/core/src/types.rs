use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bandit scope used by the store-backed engine: one independent arm set per
/// (slot, social group) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub slot_id: String,
    pub social_group_id: String,
}

impl ScopeKey {
    pub fn new(slot_id: impl Into<String>, social_group_id: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
            social_group_id: social_group_id.into(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.slot_id, self.social_group_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Select,
    Click,
}

/// Notification emitted after every successful select or click.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub event_type: EventType,
    pub slot_id: String,
    pub banner_id: String,
    pub social_group_id: String,
    pub timestamp_micros: i64,
}

impl Event {
    /// Build an event stamped with the current wall-clock time.
    pub fn now(event_type: EventType, scope: &ScopeKey, banner_id: impl Into<String>) -> Self {
        Self {
            event_type,
            slot_id: scope.slot_id.clone(),
            banner_id: banner_id.into(),
            social_group_id: scope.social_group_id.clone(),
            timestamp_micros: Utc::now().timestamp_micros(),
        }
    }
}
