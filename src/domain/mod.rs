//! Domain types for the podspeed benchmark.
//!
//! This module contains the core data structures:
//! - Milestone: The fixed lifecycle vocabulary
//! - LifecycleRecord: Per-pod milestone timestamps
//! - Event / RawNotification: Deduplicated events and their raw source
//! - RunReport: Finalized timings of a run

pub mod events;
pub mod milestone;
pub mod record;
pub mod run;

// Re-export commonly used types
pub use events::{Event, NotificationKind, RawNotification};
pub use milestone::{Conditions, Milestone};
pub use record::{as_millis_f64, LifecycleRecord};
pub use run::{Metric, RunReport};
