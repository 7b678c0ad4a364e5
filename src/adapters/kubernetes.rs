//! Kubernetes adapter backed by `kube`.
//!
//! Pods are created and deleted through the namespaced pod API. The
//! notification feed is a raw watch started at the current resource version,
//! so only changes made after subscribing are observed. The API server closes
//! a watch after its timeout window (290s by default in `kube`); the feed then
//! resumes from the last resource version it saw. Errors are not retried:
//! a watch error event or a failed request fails the run.

use std::future::Future;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::Client;
use tracing::{debug, info};

use super::{ClusterClient, NotificationStream};
use crate::domain::{Conditions, Milestone, RawNotification};

/// Pod API of one namespace, optionally narrowed by a label selector
pub struct KubeCluster {
    pods: Api<Pod>,
    namespace: String,
    selector: Option<String>,
}

impl KubeCluster {
    /// Connect using the default kubeconfig / in-cluster configuration
    pub async fn connect(namespace: &str) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to load Kubernetes config")?;
        Ok(Self::new(client, namespace))
    }

    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            selector: None,
        }
    }

    /// Only watch pods matching a label selector
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Namespace the pods are created in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    type Spec = Pod;

    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn create_entity(&self, pod: Pod) -> Result<String> {
        let requested = pod.metadata.name.clone().unwrap_or_default();
        let created = self
            .pods
            .create(&PostParams::default(), &pod)
            .await
            .with_context(|| format!("Failed to create pod {}", requested))?;

        created
            .metadata
            .name
            .context("Created pod has no name")
    }

    async fn delete_entity(&self, name: &str) -> Result<()> {
        self.pods
            .delete(name, &DeleteParams::default().grace_period(0))
            .await
            .with_context(|| format!("Failed to delete pod {}", name))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream> {
        let mut list_params = ListParams::default().limit(1);
        let mut watch_params = WatchParams::default();
        if let Some(selector) = &self.selector {
            list_params = list_params.labels(selector);
            watch_params = watch_params.labels(selector);
        }

        // Start from "now" so pre-existing pods are not replayed
        let list = self
            .pods
            .list_metadata(&list_params)
            .await
            .context("Failed to list pods")?;
        let version = list
            .metadata
            .resource_version
            .unwrap_or_else(|| "0".to_string());

        let first = self
            .pods
            .watch(&watch_params, &version)
            .await
            .context("Failed to set up watch for pods")?;

        info!(
            namespace = %self.namespace,
            selector = self.selector.as_deref().unwrap_or(""),
            %version,
            "Watching pods"
        );

        let pods = self.pods.clone();
        let reopen = move |version: String| {
            let pods = pods.clone();
            let params = watch_params.clone();
            async move {
                pods.watch(&params, &version)
                    .await
                    .context("Failed to resume watch for pods")
            }
        };

        Ok(resuming_watch(first, version, reopen))
    }
}

type WatchStream = BoxStream<'static, kube::Result<WatchEvent<Pod>>>;

struct WatchState<W> {
    current: Option<WatchStream>,
    version: String,
    reopen: W,
    done: bool,
}

/// Notifications from a sequence of watch windows.
///
/// `first` is the watch already opened at `version`. When a window ends
/// without an error, `reopen` is called with the last resource version seen
/// and the feed continues from there. The stream ends after the first error.
pub fn resuming_watch<S, W, Fut>(first: S, version: String, reopen: W) -> NotificationStream
where
    S: Stream<Item = kube::Result<WatchEvent<Pod>>> + Send + 'static,
    W: FnMut(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    let state = WatchState {
        current: Some(first.boxed()),
        version,
        reopen,
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            if state.current.is_none() {
                debug!(version = %state.version, "Watch window closed, resuming");
                match (state.reopen)(state.version.clone()).await {
                    Ok(stream) => state.current = Some(stream.boxed()),
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
            }

            let Some(current) = state.current.as_mut() else {
                continue;
            };
            let next = current.next().await;

            match next {
                Some(Ok(event)) => {
                    if let Some(version) = resource_version(&event) {
                        state.version = version.to_string();
                    }
                    if let Some(item) = notification_from_watch_event(event) {
                        state.done = item.is_err();
                        return Some((item, state));
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    let err = anyhow::Error::new(e).context("Pod watch failed");
                    return Some((Err(err), state));
                }
                None => state.current = None,
            }
        }
    })
    .boxed()
}

/// Resource version carried by a watch event
fn resource_version(event: &WatchEvent<Pod>) -> Option<&str> {
    match event {
        WatchEvent::Added(pod) | WatchEvent::Modified(pod) | WatchEvent::Deleted(pod) => {
            pod.metadata.resource_version.as_deref()
        }
        WatchEvent::Bookmark(bookmark) => Some(bookmark.metadata.resource_version.as_str()),
        WatchEvent::Error(_) => None,
    }
}

/// Map a watch event to a notification; bookmarks carry nothing
pub fn notification_from_watch_event(event: WatchEvent<Pod>) -> Option<Result<RawNotification>> {
    match event {
        WatchEvent::Added(pod) => {
            let conditions = pod_conditions(&pod);
            pod.metadata
                .name
                .map(|name| Ok(RawNotification::added(name, conditions)))
        }
        WatchEvent::Modified(pod) => {
            let conditions = pod_conditions(&pod);
            pod.metadata
                .name
                .map(|name| Ok(RawNotification::modified(name, conditions)))
        }
        WatchEvent::Deleted(pod) => pod.metadata.name.map(|name| Ok(RawNotification::removed(name))),
        WatchEvent::Bookmark(_) => {
            debug!("Skipping watch bookmark");
            None
        }
        WatchEvent::Error(e) => Some(Err(anyhow::anyhow!("Pod watch error: {:?}", e))),
    }
}

/// Conditions of a pod whose status is "True"
pub fn pod_conditions(pod: &Pod) -> Conditions {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .filter(|c| c.status == "True")
                .filter_map(|c| milestone_for_condition(&c.type_))
                .collect()
        })
        .unwrap_or_default()
}

fn milestone_for_condition(condition_type: &str) -> Option<Milestone> {
    match condition_type {
        "PodScheduled" => Some(Milestone::Scheduled),
        "Initialized" => Some(Milestone::Initialized),
        "ContainersReady" => Some(Milestone::ContainersReady),
        "Ready" => Some(Milestone::Ready),
        _ => None,
    }
}
