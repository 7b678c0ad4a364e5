//! podspeed - Pod lifecycle latency benchmark
//!
//! Creates a cohort of pods, follows each of them through its lifecycle
//! (created, scheduled, initialized, containers ready, ready, deleted) and
//! reports latency statistics per milestone.
//!
//! # Architecture
//!
//! The system is built around a single event feed:
//! - Raw pod change notifications are translated into milestone events,
//!   each (pod, milestone) pair at most once
//! - Per-pod timestamps are recorded by the feed task only
//! - The driver creates/deletes pods and waits on counting barriers
//!   over the same events
//!
//! # Modules
//!
//! - `adapters`: Cluster integrations (Kubernetes)
//! - `core`: Timing engine (Translator, Aggregator, Synchronizer, Stats)
//! - `domain`: Data structures (Milestone, Event, LifecycleRecord, RunReport)
//! - `templates`: Pod templates (built-in and YAML manifests)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Create 10 pods in parallel and report their startup latency
//! podspeed run -n default --pods 10
//!
//! # One after another, including deletion latency
//! podspeed run --type knative-head --pods 5 --sequential
//!
//! # List built-in pod types
//! podspeed types
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod templates;

// Re-export main types at crate root for convenience
pub use adapters::{ClusterClient, KubeCluster};
pub use core::{RunOptions, Summary, SyncError, Synchronizer};
pub use domain::{Event, Milestone, RunReport};
pub use templates::TemplateRegistry;
