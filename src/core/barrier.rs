//! Counting barriers over the live event feed.
//!
//! The barrier drains the event channel, counting every event by milestone,
//! until the count for the awaited milestone reaches its target. It wakes on
//! every event, on cancellation and on the run deadline, so a pod that never
//! reaches the milestone cannot hang the process once either fires.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::synchronizer::SyncError;
use crate::domain::{Event, Milestone};

/// Receiving side of the feed task's event channel
pub type EventReceiver = mpsc::Receiver<Result<Event, SyncError>>;

/// Milestone counters fed by the event channel
pub struct EventBarrier {
    events: EventReceiver,
    counts: [usize; 6],
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl EventBarrier {
    pub fn new(events: EventReceiver, cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self {
            events,
            counts: [0; 6],
            cancel,
            deadline,
        }
    }

    /// Events observed so far for a milestone
    pub fn observed(&self, milestone: Milestone) -> usize {
        self.counts[milestone.index()]
    }

    /// Block until `expected` events for `milestone` have been observed in
    /// total since the barrier was created.
    pub async fn wait_for(&mut self, milestone: Milestone, expected: usize) -> Result<(), SyncError> {
        loop {
            let observed = self.observed(milestone);
            if observed >= expected {
                debug!(%milestone, observed, expected, "Barrier released");
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    warn!(%milestone, observed, expected, "Barrier wait cancelled");
                    return Err(SyncError::BarrierCancelled { milestone, observed, expected });
                }
                _ = until(self.deadline) => {
                    warn!(%milestone, observed, expected, "Barrier wait timed out");
                    return Err(SyncError::BarrierTimeout { milestone, observed, expected });
                }
                message = self.events.recv() => match message {
                    Some(Ok(event)) => self.count(&event),
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(SyncError::Subscription("event feed closed".to_string()));
                    }
                },
            }
        }
    }

    /// Run `operation` to completion, counting events that arrive meanwhile.
    ///
    /// Keeps the feed task from stalling on a full channel while create or
    /// delete requests are in flight. A closed feed is left for the next
    /// `wait_for` to report.
    pub async fn drain_during<F, T>(&mut self, operation: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        tokio::pin!(operation);
        let mut feed_open = true;

        loop {
            tokio::select! {
                biased;

                result = &mut operation => return result,
                message = self.events.recv(), if feed_open => match message {
                    Some(Ok(event)) => self.count(&event),
                    Some(Err(e)) => return Err(e),
                    None => feed_open = false,
                },
            }
        }
    }

    fn count(&mut self, event: &Event) {
        self.counts[event.milestone.index()] += 1;
    }
}

/// Resolves at the deadline, never without one
pub(crate) async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
