//! Per-pod lifecycle record.
//!
//! A record holds one timestamp per milestone. Timestamps are
//! first-write-wins: once a milestone is recorded it never changes.

use chrono::{DateTime, Duration, Utc};

use super::milestone::Milestone;

/// Timestamps of every milestone observed for one pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleRecord {
    stamps: [Option<DateTime<Utc>>; 6],
}

impl LifecycleRecord {
    /// Create a record with every milestone unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a milestone if it has not been recorded yet.
    ///
    /// Returns whether the milestone was newly set.
    pub fn set(&mut self, milestone: Milestone, at: DateTime<Utc>) -> bool {
        let slot = &mut self.stamps[milestone.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        true
    }

    pub fn get(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        self.stamps[milestone.index()]
    }

    pub fn is_set(&self, milestone: Milestone) -> bool {
        self.get(milestone).is_some()
    }

    /// Elapsed time between two milestones, `None` until both are reached
    pub fn duration_from(&self, from: Milestone, to: Milestone) -> Option<Duration> {
        Some(self.get(to)? - self.get(from)?)
    }

    /// Elapsed time from `Created` to `milestone`
    pub fn time_to(&self, milestone: Milestone) -> Option<Duration> {
        self.duration_from(Milestone::Created, milestone)
    }

    /// Milestones reached so far with their timestamps, in lifecycle order
    pub fn reached(&self) -> impl Iterator<Item = (Milestone, DateTime<Utc>)> + '_ {
        Milestone::ALL
            .into_iter()
            .filter_map(move |m| self.get(m).map(|at| (m, at)))
    }
}

/// Convert a duration to fractional milliseconds
pub fn as_millis_f64(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(micros) => micros as f64 / 1000.0,
        None => duration.num_milliseconds() as f64,
    }
}
