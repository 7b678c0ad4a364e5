//! Translation of raw watch notifications into milestone events.
//!
//! Each notification is stamped with the wall-clock time it was received,
//! not with any server-supplied time: the benchmark measures the latency an
//! observer perceives. Notifications must be fed in arrival order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use super::aggregator::TimingAggregator;
use super::synchronizer::SyncError;
use crate::domain::{Event, Milestone, NotificationKind, RawNotification};

/// Stateful notification-to-event translator
///
/// Owns the [`TimingAggregator`]; an event is emitted only when the
/// aggregator reports the milestone as newly set.
#[derive(Debug)]
pub struct EventTranslator {
    aggregator: TimingAggregator,
    last_seen: Option<DateTime<Utc>>,
}

impl EventTranslator {
    pub fn new(aggregator: TimingAggregator) -> Self {
        Self {
            aggregator,
            last_seen: None,
        }
    }

    pub fn aggregator(&self) -> &TimingAggregator {
        &self.aggregator
    }

    pub fn into_aggregator(self) -> TimingAggregator {
        self.aggregator
    }

    /// Translate one notification received at `now`.
    ///
    /// Condition milestones are emitted in lifecycle order. Notifications for
    /// unregistered pods yield nothing.
    pub fn translate(&mut self, notification: &RawNotification, now: DateTime<Utc>) -> Vec<Event> {
        if !self.aggregator.is_registered(&notification.entity) {
            trace!(entity = %notification.entity, "Ignoring notification for unknown pod");
            return Vec::new();
        }

        // Never let receipt time run backwards, or durations could go negative
        let now = match self.last_seen {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_seen = Some(now);

        let candidates: Vec<Milestone> = match notification.kind {
            NotificationKind::Added => vec![Milestone::Created],
            NotificationKind::Modified => notification.conditions.iter().collect(),
            NotificationKind::Removed => vec![Milestone::Deleted],
        };

        let mut events = Vec::new();
        for milestone in candidates {
            let event = Event::new(notification.entity.clone(), milestone, now);
            if self.aggregator.apply(&event) {
                debug!(entity = %event.entity, %milestone, "Milestone reached");
                events.push(event);
            }
        }
        events
    }
}

/// Lazy stream of deduplicated events over a notification stream
///
/// Yields an error (and then whatever the source yields next) if the source
/// stream fails; ends when the source ends.
pub struct EventStream<S> {
    notifications: S,
    translator: EventTranslator,
    pending: VecDeque<Event>,
}

impl<S> EventStream<S> {
    pub fn new(notifications: S, translator: EventTranslator) -> Self {
        Self {
            notifications,
            translator,
            pending: VecDeque::new(),
        }
    }

    /// Stop translating and take the translator back
    pub fn into_translator(self) -> EventTranslator {
        self.translator
    }
}

impl<S> Stream for EventStream<S>
where
    S: Stream<Item = anyhow::Result<RawNotification>> + Unpin,
{
    type Item = Result<Event, SyncError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            match ready!(this.notifications.poll_next_unpin(cx)) {
                Some(Ok(notification)) => {
                    let events = this.translator.translate(&notification, Utc::now());
                    this.pending.extend(events);
                }
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(SyncError::Subscription(format!("{:#}", e)))));
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
