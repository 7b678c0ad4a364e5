//! Synchronizer Integration Tests
//!
//! Drives whole runs against an in-memory cluster whose pods progress
//! through their lifecycle on timers (tokio paused time).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use podspeed::adapters::{ClusterClient, NotificationStream};
use podspeed::core::{EntityFactory, Phase, RemoteOperation, RunOptions, SyncError, Synchronizer};
use podspeed::domain::{Conditions, Metric, Milestone, RawNotification};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Every pod becomes ready
    Healthy,
    /// Only the first `n` created pods become ready, the rest stay scheduled
    ReadyOnly(usize),
    /// Every create request is rejected
    RejectCreates,
    /// The feed fails after the first pod is ready
    BreakFeed,
    /// Create requests never complete
    HangCreates,
    /// Delete requests never complete
    HangDeletes,
}

type Feed = mpsc::UnboundedSender<Result<RawNotification>>;

/// In-memory cluster; each pod takes `step * (index + 1)` per milestone
struct FakeCluster {
    behavior: Behavior,
    step: Duration,
    feed: Mutex<Option<Feed>>,
    log: Mutex<Vec<String>>,
    created: AtomicUsize,
}

impl FakeCluster {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            step: Duration::from_millis(10),
            feed: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn requests(&self, operation: &str) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix(&format!("{}:", operation)).map(String::from))
            .collect()
    }

    fn sender(&self) -> Result<Feed> {
        self.feed
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("not subscribed"))
    }
}

fn progression(reaches_ready: bool) -> Vec<Conditions> {
    let scheduled = Conditions::none().with(Milestone::Scheduled);
    if !reaches_ready {
        return vec![scheduled, scheduled];
    }

    let initialized = scheduled.with(Milestone::Initialized);
    let containers_ready = initialized.with(Milestone::ContainersReady);
    // Ready is reported twice, like a status update after readiness
    vec![
        scheduled,
        initialized,
        containers_ready,
        Conditions::all(),
        Conditions::all(),
    ]
}

#[async_trait]
impl ClusterClient for FakeCluster {
    type Spec = String;

    fn name(&self) -> &str {
        "fake"
    }

    async fn create_entity(&self, spec: String) -> Result<String> {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("create:{}", spec));

        match self.behavior {
            Behavior::RejectCreates => anyhow::bail!("admission webhook denied the request"),
            Behavior::HangCreates => return std::future::pending().await,
            _ => {}
        }

        let tx = self.sender()?;
        let reaches_ready = match self.behavior {
            Behavior::ReadyOnly(n) => index < n,
            _ => true,
        };
        let break_feed = matches!(self.behavior, Behavior::BreakFeed) && index == 0;
        let step = self.step * (index as u32 + 1);
        let name = spec.clone();

        tokio::spawn(async move {
            let _ = tx.send(Ok(RawNotification::added(&name, Conditions::none())));
            for conditions in progression(reaches_ready) {
                tokio::time::sleep(step).await;
                let _ = tx.send(Ok(RawNotification::modified(&name, conditions)));
            }
            if break_feed {
                let _ = tx.send(Err(anyhow!("watch expired")));
            }
        });

        Ok(spec)
    }

    async fn delete_entity(&self, name: &str) -> Result<()> {
        self.log.lock().unwrap().push(format!("delete:{}", name));
        if let Behavior::HangDeletes = self.behavior {
            return std::future::pending().await;
        }

        let tx = self.sender()?;
        let step = self.step;
        let name = name.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(step).await;
            // Terminating pods still report their last conditions
            let _ = tx.send(Ok(RawNotification::modified(&name, Conditions::all())));
            tokio::time::sleep(step).await;
            let _ = tx.send(Ok(RawNotification::removed(&name)));
        });

        Ok(())
    }

    async fn subscribe(&self) -> Result<NotificationStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.feed.lock().unwrap() = Some(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// Names pods `pod-0`, `pod-1`, ...
#[derive(Default)]
struct NumberedPods {
    next: AtomicUsize,
}

impl EntityFactory for NumberedPods {
    type Spec = String;

    fn next_name(&self) -> String {
        format!("pod-{}", self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn build(&self, name: &str) -> String {
        name.to_string()
    }
}

fn synchronizer(behavior: Behavior) -> Synchronizer<FakeCluster> {
    Synchronizer::new(FakeCluster::new(behavior), CancellationToken::new())
}

#[tokio::test(start_paused = true)]
async fn test_parallel_cohort_reaches_ready_and_gone() {
    let mut sync = synchronizer(Behavior::Healthy);
    let options = RunOptions {
        collect_delete_timings: true,
        ..Default::default()
    };

    let report = sync.run(3, &NumberedPods::default(), &options).await.unwrap();

    assert_eq!(sync.phase(), Phase::Done);
    assert_eq!(report.cohort_size(), 3);

    // Repeated Ready notifications must not be counted twice
    assert_eq!(report.observed(Milestone::Ready), 3);
    assert_eq!(report.observed(Milestone::Deleted), 3);

    for record in report.records.values() {
        assert_eq!(record.reached().count(), Milestone::ALL.len());
    }

    let ready = report.samples(Metric::TimeToReady);
    assert_eq!(ready.len(), 3);
    assert!(ready.iter().all(|ms| *ms >= 0.0));
    assert_eq!(report.samples(Metric::TimeToDeleted).len(), 3);
    assert!(report.summary(Metric::TimeToReady).is_ok());

    let mut deleted = sync.client().requests("delete");
    deleted.sort();
    assert_eq!(deleted, vec!["pod-0", "pod-1", "pod-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_run_without_delete_timings() {
    let mut sync = synchronizer(Behavior::Healthy);

    let report = sync
        .run(2, &NumberedPods::default(), &RunOptions::default())
        .await
        .unwrap();

    // Deletes are issued but not waited for
    assert_eq!(sync.client().requests("delete").len(), 2);
    assert_eq!(report.delete_requested.len(), 2);
    assert_eq!(report.observed(Milestone::Ready), 2);
    assert_eq!(report.samples(Metric::TimeToReady).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_skip_delete_leaves_pods() {
    let mut sync = synchronizer(Behavior::Healthy);
    let options = RunOptions {
        skip_delete: true,
        collect_delete_timings: true,
        ..Default::default()
    };

    let report = sync.run(2, &NumberedPods::default(), &options).await.unwrap();

    assert!(sync.client().requests("delete").is_empty());
    assert!(report.delete_requested.is_empty());
    assert!(report.samples(Metric::TimeToDeleted).is_empty());
    assert!(report
        .records
        .values()
        .all(|record| !record.is_set(Milestone::Deleted)));
}

#[tokio::test(start_paused = true)]
async fn test_sequential_run_waits_for_each_pod() {
    let mut sync = synchronizer(Behavior::Healthy);
    let options = RunOptions {
        sequential: true,
        ..Default::default()
    };

    let report = sync.run(3, &NumberedPods::default(), &options).await.unwrap();

    assert_eq!(
        sync.client().log(),
        vec![
            "create:pod-0",
            "delete:pod-0",
            "create:pod-1",
            "delete:pod-1",
            "create:pod-2",
            "delete:pod-2",
        ]
    );
    assert_eq!(report.observed(Milestone::Deleted), 3);
    assert_eq!(report.samples(Metric::TimeToDeleted).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reports_partial_progress() {
    let mut sync = synchronizer(Behavior::ReadyOnly(1));
    let options = RunOptions {
        timeout: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    let err = sync
        .run(2, &NumberedPods::default(), &options)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::BarrierTimeout {
            milestone: Milestone::Ready,
            observed: 1,
            expected: 2,
        }
    ));
    assert!(err.to_string().contains("1/2"));
    assert!(err.is_cancellation());
    assert_eq!(sync.phase(), Phase::Aborted);

    // Nothing is deleted when the run never got past readiness
    assert!(sync.client().requests("delete").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_covers_hung_create_requests() {
    let mut sync = synchronizer(Behavior::HangCreates);
    let options = RunOptions {
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        sync.run(2, &NumberedPods::default(), &options),
    )
    .await
    .expect("run must honor its own timeout");

    let err = outcome.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Timeout {
            phase: Phase::Creating
        }
    ));
    assert!(err.is_cancellation());
    assert_eq!(sync.phase(), Phase::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_covers_hung_delete_requests() {
    let mut sync = synchronizer(Behavior::HangDeletes);
    let options = RunOptions {
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        sync.run(2, &NumberedPods::default(), &options),
    )
    .await
    .expect("run must honor its own timeout");

    assert!(matches!(
        outcome.unwrap_err(),
        SyncError::Timeout {
            phase: Phase::Deleting
        }
    ));
    assert_eq!(sync.client().requests("delete").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_releases_the_barrier() {
    let cancel = CancellationToken::new();
    let mut sync = Synchronizer::new(FakeCluster::new(Behavior::ReadyOnly(1)), cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let err = sync
        .run(2, &NumberedPods::default(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::BarrierCancelled {
            milestone: Milestone::Ready,
            observed: 1,
            expected: 2,
        }
    ));
    assert_eq!(sync.phase(), Phase::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_create_aborts_run() {
    let mut sync = synchronizer(Behavior::RejectCreates);

    let err = sync
        .run(2, &NumberedPods::default(), &RunOptions::default())
        .await
        .unwrap_err();

    match err {
        SyncError::RemoteCall {
            operation, message, ..
        } => {
            assert_eq!(operation, RemoteOperation::Create);
            assert!(message.contains("admission webhook"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sync.phase(), Phase::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_feed_failure_aborts_run() {
    let mut sync = synchronizer(Behavior::BreakFeed);

    let err = sync
        .run(2, &NumberedPods::default(), &RunOptions::default())
        .await
        .unwrap_err();

    match err {
        SyncError::Subscription(message) => assert!(message.contains("watch expired")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!matches!(sync.phase(), Phase::Done));
}

#[tokio::test(start_paused = true)]
async fn test_large_cohort_with_small_event_buffer() {
    let mut sync = synchronizer(Behavior::Healthy);
    let options = RunOptions {
        collect_delete_timings: true,
        event_buffer: 1,
        ..Default::default()
    };

    let report = sync.run(50, &NumberedPods::default(), &options).await.unwrap();

    assert_eq!(report.observed(Milestone::Created), 50);
    assert_eq!(report.observed(Milestone::Ready), 50);
    assert_eq!(report.samples(Metric::TimeToReady).len(), 50);
}

#[tokio::test]
async fn test_empty_cohort_is_rejected() {
    let mut sync = synchronizer(Behavior::Healthy);

    let err = sync
        .run(0, &NumberedPods::default(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidCohort));
    assert!(sync.client().log().is_empty());
}
