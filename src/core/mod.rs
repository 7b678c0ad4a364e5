//! Core lifecycle-timing engine.
//!
//! This module contains:
//! - TimingAggregator: Per-pod lifecycle records
//! - EventTranslator: Raw notifications to deduplicated events
//! - EventBarrier: Counting barriers over the event feed
//! - Synchronizer: Drives a cohort through create/delete phases
//! - Stats: Summary statistics over latency samples

pub mod aggregator;
pub mod barrier;
pub mod stats;
pub mod synchronizer;
pub mod translator;

// Re-export commonly used types
pub use aggregator::TimingAggregator;
pub use barrier::EventBarrier;
pub use stats::{StatsError, Summary};
pub use synchronizer::{
    EntityFactory, Phase, RemoteOperation, RunOptions, SyncError, Synchronizer,
    DEFAULT_EVENT_BUFFER,
};
pub use translator::{EventStream, EventTranslator};
