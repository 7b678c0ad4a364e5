//! Per-pod timing state.
//!
//! The aggregator owns one [`LifecycleRecord`] per registered pod. Pods are
//! registered before their create request is issued so that a notification
//! arriving immediately after creation is never lost. Records are never
//! removed during a run.

use std::collections::HashMap;

use tracing::trace;

use crate::domain::{Event, LifecycleRecord};

/// Lifecycle records keyed by pod name
#[derive(Debug, Default)]
pub struct TimingAggregator {
    records: HashMap<String, LifecycleRecord>,
}

impl TimingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
        }
    }

    /// Start tracking a pod. Returns false if it was already registered;
    /// an existing record is left untouched.
    pub fn register(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.records.contains_key(&name) {
            return false;
        }
        self.records.insert(name, LifecycleRecord::new());
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Record an event. Returns whether it set a new timestamp; events for
    /// unregistered pods or already-recorded milestones are no-ops.
    pub fn apply(&mut self, event: &Event) -> bool {
        match self.records.get_mut(&event.entity) {
            Some(record) => record.set(event.milestone, event.timestamp),
            None => {
                trace!(entity = %event.entity, "Ignoring event for unregistered pod");
                false
            }
        }
    }

    pub fn record(&self, name: &str) -> Option<&LifecycleRecord> {
        self.records.get(name)
    }

    /// Copy of every record
    pub fn snapshot(&self) -> HashMap<String, LifecycleRecord> {
        self.records.clone()
    }

    /// Hand the records over without copying
    pub fn into_snapshot(self) -> HashMap<String, LifecycleRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Milestone;
    use chrono::Utc;

    #[test]
    fn test_register_is_idempotent() {
        let mut aggregator = TimingAggregator::new();
        assert!(aggregator.register("a"));

        let event = Event::new("a", Milestone::Created, Utc::now());
        assert!(aggregator.apply(&event));

        // Re-registering must not reset the record
        assert!(!aggregator.register("a"));
        assert!(aggregator.record("a").unwrap().is_set(Milestone::Created));
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_apply_ignores_unregistered() {
        let mut aggregator = TimingAggregator::new();
        let event = Event::new("stranger", Milestone::Ready, Utc::now());

        assert!(!aggregator.apply(&event));
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_apply_deduplicates() {
        let mut aggregator = TimingAggregator::new();
        aggregator.register("a");

        let first = Event::new("a", Milestone::Ready, Utc::now());
        let again = Event::new("a", Milestone::Ready, Utc::now());

        assert!(aggregator.apply(&first));
        assert!(!aggregator.apply(&again));
        assert_eq!(
            aggregator.record("a").unwrap().get(Milestone::Ready),
            Some(first.timestamp)
        );
    }

    #[test]
    fn test_snapshot() {
        let mut aggregator = TimingAggregator::with_capacity(2);
        aggregator.register("a");
        aggregator.register("b");

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key("a"));

        let owned = aggregator.into_snapshot();
        assert_eq!(owned, snapshot);
    }
}
