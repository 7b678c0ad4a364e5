//! Result of one benchmark run.
//!
//! A `RunReport` is the finalized snapshot handed over by the synchronizer
//! once every barrier has been released. It is read-only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::milestone::Milestone;
use super::record::{as_millis_f64, LifecycleRecord};
use crate::core::stats::{StatsError, Summary};

/// Latency metrics derived from a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TimeToScheduled,
    TimeToInitialized,
    TimeToContainersReady,
    TimeToReady,

    /// From the delete request to the pod being gone
    TimeToDeleted,
}

impl Metric {
    /// Startup metrics, measured from `Created`
    pub const STARTUP: [Metric; 4] = [
        Metric::TimeToScheduled,
        Metric::TimeToInitialized,
        Metric::TimeToContainersReady,
        Metric::TimeToReady,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::TimeToScheduled => "Time to scheduled",
            Metric::TimeToInitialized => "Time to initialized",
            Metric::TimeToContainersReady => "Time to containers ready",
            Metric::TimeToReady => "Time to ready",
            Metric::TimeToDeleted => "Time to deleted",
        }
    }

    /// Milestone that ends the measured interval
    pub fn milestone(self) -> Milestone {
        match self {
            Metric::TimeToScheduled => Milestone::Scheduled,
            Metric::TimeToInitialized => Milestone::Initialized,
            Metric::TimeToContainersReady => Milestone::ContainersReady,
            Metric::TimeToReady => Milestone::Ready,
            Metric::TimeToDeleted => Milestone::Deleted,
        }
    }
}

/// Finalized per-pod timings of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Lifecycle record per pod name
    pub records: HashMap<String, LifecycleRecord>,

    /// When the delete request was issued, per pod name
    pub delete_requested: HashMap<String, DateTime<Utc>>,

    /// Number of milestone events the barriers consumed, by milestone
    pub observed: HashMap<Milestone, usize>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    pub fn cohort_size(&self) -> usize {
        self.records.len()
    }

    /// Number of events observed for a milestone
    pub fn observed(&self, milestone: Milestone) -> usize {
        self.observed.get(&milestone).copied().unwrap_or(0)
    }

    /// Per-pod durations in milliseconds for a metric.
    ///
    /// Pods that never reached either endpoint contribute no sample.
    pub fn samples(&self, metric: Metric) -> Vec<f64> {
        match metric {
            Metric::TimeToDeleted => self
                .records
                .iter()
                .filter_map(|(name, record)| {
                    let requested = self.delete_requested.get(name)?;
                    let deleted = record.get(Milestone::Deleted)?;
                    Some(as_millis_f64(deleted - *requested))
                })
                .collect(),
            _ => self
                .records
                .values()
                .filter_map(|record| record.time_to(metric.milestone()))
                .map(as_millis_f64)
                .collect(),
        }
    }

    /// Summary statistics for a metric
    pub fn summary(&self, metric: Metric) -> Result<Summary, StatsError> {
        Summary::from_samples(&self.samples(metric))
    }

    /// Wall-clock duration of the whole run in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        as_millis_f64(self.completed_at - self.started_at)
    }
}
