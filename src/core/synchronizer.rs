//! Batch synchronizer driving a cohort through create and delete phases.
//!
//! Two tasks cooperate during a run:
//! - the feed task drains the notification stream, translates it into
//!   events (it is the only writer of the timing records) and forwards
//!   them over a bounded channel, waiting for capacity instead of dropping;
//! - the driver issues create/delete requests and blocks on barriers over
//!   that channel.
//!
//! Once the barriers are satisfied the feed task is stopped and hands its
//! records back through its join handle, so the report is built from a
//! finalized snapshot.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::aggregator::TimingAggregator;
use super::barrier::{until, EventBarrier};
use super::translator::{EventStream, EventTranslator};
use crate::adapters::ClusterClient;
use crate::domain::{Event, Milestone, RawNotification, RunReport};

/// Default capacity of the event channel between feed and driver
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Errors that end a run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cohort size must be at least 1")]
    InvalidCohort,

    #[error("Failed to {operation} pod {entity}: {message}")]
    RemoteCall {
        operation: RemoteOperation,
        entity: String,
        message: String,
    },

    #[error("Event subscription failed: {0}")]
    Subscription(String),

    #[error("Timed out waiting for {milestone}: {observed}/{expected} pods reached it")]
    BarrierTimeout {
        milestone: Milestone,
        observed: usize,
        expected: usize,
    },

    #[error("Cancelled while waiting for {milestone}: {observed}/{expected} pods reached it")]
    BarrierCancelled {
        milestone: Milestone,
        observed: usize,
        expected: usize,
    },

    #[error("Cancelled during {phase}")]
    Cancelled { phase: Phase },

    #[error("Timed out during {phase}")]
    Timeout { phase: Phase },
}

impl SyncError {
    /// Whether the run ended because of a timeout or cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            SyncError::BarrierTimeout { .. }
                | SyncError::BarrierCancelled { .. }
                | SyncError::Cancelled { .. }
                | SyncError::Timeout { .. }
        )
    }
}

/// Remote call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    Create,
    Delete,
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOperation::Create => f.write_str("create"),
            RemoteOperation::Delete => f.write_str("delete"),
        }
    }
}

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Creating,
    AwaitingReady,
    Deleting,
    AwaitingGone,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Creating => "creating",
            Phase::AwaitingReady => "awaiting-ready",
            Phase::Deleting => "deleting",
            Phase::AwaitingGone => "awaiting-gone",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How a run is driven
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Leave the pods in place once they are ready
    pub skip_delete: bool,

    /// Create one pod at a time, waiting for it (and its deletion) before
    /// the next; otherwise submit all creates and wait for the cohort
    pub sequential: bool,

    /// Wait for every pod to be gone and report deletion latency
    pub collect_delete_timings: bool,

    /// Deadline for the whole run, measured from its start
    pub timeout: Option<Duration>,

    /// Capacity of the event channel
    pub event_buffer: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_delete: false,
            sequential: false,
            collect_delete_timings: false,
            timeout: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl RunOptions {
    /// Whether the run waits for deleted pods to be gone
    pub fn awaits_deletion(&self) -> bool {
        !self.skip_delete && (self.sequential || self.collect_delete_timings)
    }
}

/// Builds the specs for a cohort
pub trait EntityFactory: Send + Sync {
    type Spec;

    /// A fresh pod name, unique within the run
    fn next_name(&self) -> String;

    /// The object to submit for a pod name
    fn build(&self, name: &str) -> Self::Spec;
}

/// Drives cohorts through the cluster and collects their timings
pub struct Synchronizer<C> {
    client: C,
    cancel: CancellationToken,
    phase: Phase,
    deadline: Option<Instant>,
}

impl<C: ClusterClient> Synchronizer<C> {
    /// Create a synchronizer observing the given cancellation token
    pub fn new(client: C, cancel: CancellationToken) -> Self {
        Self {
            client,
            cancel,
            phase: Phase::Idle,
            deadline: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Create `cohort_size` pods, wait for them to become ready, optionally
    /// delete them and wait for them to be gone.
    #[instrument(skip(self, factory, options), fields(client = %self.client.name()))]
    pub async fn run<F>(
        &mut self,
        cohort_size: usize,
        factory: &F,
        options: &RunOptions,
    ) -> Result<RunReport, SyncError>
    where
        F: EntityFactory<Spec = C::Spec>,
    {
        if cohort_size == 0 {
            return Err(SyncError::InvalidCohort);
        }

        let started_at = Utc::now();
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        self.deadline = deadline;

        // Register every name before anything is created
        let names: Vec<String> = (0..cohort_size).map(|_| factory.next_name()).collect();
        let mut aggregator = TimingAggregator::with_capacity(cohort_size);
        for name in &names {
            aggregator.register(name.as_str());
        }

        let notifications = match self.client.subscribe().await {
            Ok(notifications) => notifications,
            Err(e) => {
                self.enter(Phase::Aborted);
                return Err(SyncError::Subscription(format!("{:#}", e)));
            }
        };

        let feed_cancel = self.cancel.child_token();
        let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
        let events = EventStream::new(notifications, EventTranslator::new(aggregator));
        let feed = tokio::spawn(run_feed(events, tx, feed_cancel.clone()));

        info!(
            cohort_size,
            sequential = options.sequential,
            skip_delete = options.skip_delete,
            "Starting run"
        );

        let mut barrier = EventBarrier::new(rx, self.cancel.clone(), deadline);
        let mut delete_requested = HashMap::new();
        let outcome = self
            .drive(&names, factory, options, &mut barrier, &mut delete_requested)
            .await;

        let observed: HashMap<Milestone, usize> = Milestone::ALL
            .into_iter()
            .map(|m| (m, barrier.observed(m)))
            .collect();

        // Stop the feed and take the records back
        feed_cancel.cancel();
        drop(barrier);
        let aggregator = feed
            .await
            .map_err(|e| SyncError::Subscription(format!("feed task failed: {}", e)));

        match (outcome, aggregator) {
            (Ok(()), Ok(aggregator)) => {
                self.enter(Phase::Done);
                Ok(RunReport {
                    records: aggregator.into_snapshot(),
                    delete_requested,
                    observed,
                    started_at,
                    completed_at: Utc::now(),
                })
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(phase = %self.phase, error = %e, "Run aborted");
                self.enter(Phase::Aborted);
                Err(e)
            }
        }
    }

    async fn drive<F>(
        &mut self,
        names: &[String],
        factory: &F,
        options: &RunOptions,
        barrier: &mut EventBarrier,
        delete_requested: &mut HashMap<String, DateTime<Utc>>,
    ) -> Result<(), SyncError>
    where
        F: EntityFactory<Spec = C::Spec>,
    {
        if options.sequential {
            for (i, name) in names.iter().enumerate() {
                let pod = std::slice::from_ref(name);

                self.enter(Phase::Creating);
                barrier.drain_during(self.create_all(pod, factory)).await?;
                self.enter(Phase::AwaitingReady);
                barrier.wait_for(Milestone::Ready, i + 1).await?;

                if options.skip_delete {
                    continue;
                }

                self.enter(Phase::Deleting);
                barrier
                    .drain_during(self.delete_all(pod, delete_requested))
                    .await?;
                self.enter(Phase::AwaitingGone);
                barrier.wait_for(Milestone::Deleted, i + 1).await?;
            }
            return Ok(());
        }

        self.enter(Phase::Creating);
        barrier.drain_during(self.create_all(names, factory)).await?;
        self.enter(Phase::AwaitingReady);
        barrier.wait_for(Milestone::Ready, names.len()).await?;

        if options.skip_delete {
            return Ok(());
        }

        self.enter(Phase::Deleting);
        barrier
            .drain_during(self.delete_all(names, delete_requested))
            .await?;

        if options.awaits_deletion() {
            self.enter(Phase::AwaitingGone);
            barrier.wait_for(Milestone::Deleted, names.len()).await?;
        }
        Ok(())
    }

    /// Submit create requests concurrently; the first failure is fatal
    async fn create_all<F>(&self, names: &[String], factory: &F) -> Result<(), SyncError>
    where
        F: EntityFactory<Spec = C::Spec>,
    {
        let requests = names.iter().map(|name| async move {
            let created = self
                .client
                .create_entity(factory.build(name))
                .await
                .map_err(|e| SyncError::RemoteCall {
                    operation: RemoteOperation::Create,
                    entity: name.clone(),
                    message: format!("{:#}", e),
                })?;

            if &created != name {
                warn!(requested = %name, created = %created, "Cluster assigned a different pod name");
            }
            debug!(entity = %name, "Create request accepted");
            Ok::<_, SyncError>(())
        });

        self.race(try_join_all(requests)).await
    }

    /// Submit delete requests concurrently, remembering when each was issued
    async fn delete_all(
        &self,
        names: &[String],
        delete_requested: &mut HashMap<String, DateTime<Utc>>,
    ) -> Result<(), SyncError> {
        let requested_at = Utc::now();
        for name in names {
            delete_requested.insert(name.clone(), requested_at);
        }

        let requests = names.iter().map(|name| async move {
            self.client
                .delete_entity(name)
                .await
                .map_err(|e| SyncError::RemoteCall {
                    operation: RemoteOperation::Delete,
                    entity: name.clone(),
                    message: format!("{:#}", e),
                })?;
            debug!(entity = %name, "Delete request accepted");
            Ok::<_, SyncError>(())
        });

        self.race(try_join_all(requests)).await
    }

    /// Await remote requests unless the run is cancelled or out of time
    async fn race<F, T>(&self, requests: F) -> Result<(), SyncError>
    where
        F: std::future::Future<Output = Result<T, SyncError>>,
    {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(SyncError::Cancelled { phase: self.phase }),
            _ = until(self.deadline) => {
                warn!(phase = %self.phase, "Run timed out with requests in flight");
                Err(SyncError::Timeout { phase: self.phase })
            }
            result = requests => result.map(|_| ()),
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "Phase transition");
            self.phase = phase;
        }
    }
}

/// Feed task: forward translated events until cancelled or the feed ends.
///
/// Sending waits for channel capacity so no event is ever dropped. The
/// aggregator is returned to the caller when the task stops.
async fn run_feed<S>(
    mut events: EventStream<S>,
    tx: mpsc::Sender<Result<Event, SyncError>>,
    cancel: CancellationToken,
) -> TimingAggregator
where
    S: Stream<Item = anyhow::Result<RawNotification>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };

        let Some(item) = next else {
            warn!("Notification feed ended");
            break;
        };

        let failed = item.is_err();
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        if failed {
            break;
        }
    }

    debug!("Feed task stopped");
    events.into_translator().into_aggregator()
}
