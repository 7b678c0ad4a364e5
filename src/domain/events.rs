//! Milestone events and the raw notifications they are derived from.
//!
//! Raw notifications come straight from the cluster watch feed and may
//! repeat the same observation many times. Events are the deduplicated
//! result: at most one per (pod, milestone).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::milestone::{Conditions, Milestone};

/// A milestone observed for the first time for one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Pod name
    pub entity: String,

    /// Milestone that was reached
    pub milestone: Milestone,

    /// Wall-clock time the notification was received
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(entity: impl Into<String>, milestone: Milestone, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity: entity.into(),
            milestone,
            timestamp,
        }
    }
}

/// Kind of change reported by the watch feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The pod appeared
    Added,

    /// The pod's state changed
    Modified,

    /// The pod is gone
    Removed,
}

/// A single change notification from the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub kind: NotificationKind,

    /// Pod name
    pub entity: String,

    /// Conditions currently true (empty for removals)
    pub conditions: Conditions,
}

impl RawNotification {
    pub fn added(entity: impl Into<String>, conditions: Conditions) -> Self {
        Self {
            kind: NotificationKind::Added,
            entity: entity.into(),
            conditions,
        }
    }

    pub fn modified(entity: impl Into<String>, conditions: Conditions) -> Self {
        Self {
            kind: NotificationKind::Modified,
            entity: entity.into(),
            conditions,
        }
    }

    pub fn removed(entity: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Removed,
            entity: entity.into(),
            conditions: Conditions::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new("basic-1", Milestone::Ready, Utc::now());

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, event);
        assert!(json.contains("\"ready\""));
    }

    #[test]
    fn test_removed_carries_no_conditions() {
        let notification = RawNotification::removed("basic-1");
        assert_eq!(notification.kind, NotificationKind::Removed);
        assert!(notification.conditions.is_empty());
    }
}
