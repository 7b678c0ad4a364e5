//! Adapter interfaces for the cluster being benchmarked.
//!
//! The synchronizer only talks to the cluster through [`ClusterClient`]:
//! create a pod, delete a pod, and subscribe to pod change notifications.

pub mod kubernetes;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::RawNotification;

// Re-export the Kubernetes adapter
pub use kubernetes::KubeCluster;

/// Stream of raw pod change notifications.
///
/// Treated as unbounded and ordered per pod; no ordering is assumed across
/// pods. An `Err` item ends the run.
pub type NotificationStream = BoxStream<'static, Result<RawNotification>>;

/// Trait for cluster backends
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Object submitted to create a pod
    type Spec: Send + 'static;

    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Create a pod, returning the name the cluster assigned
    async fn create_entity(&self, spec: Self::Spec) -> Result<String>;

    /// Delete a pod immediately
    async fn delete_entity(&self, name: &str) -> Result<()>;

    /// Subscribe to changes of the pods this client is scoped to.
    ///
    /// Must be called before any pod of the run is created.
    async fn subscribe(&self) -> Result<NotificationStream>;
}
