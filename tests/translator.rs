//! Event Translator Integration Tests
//!
//! Each (pod, milestone) pair yields at most one event no matter how the
//! notifications of a run are ordered or repeated.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};

use podspeed::core::{EventTranslator, TimingAggregator};
use podspeed::domain::{Conditions, Milestone, RawNotification};

fn translator(names: &[&str]) -> EventTranslator {
    let mut aggregator = TimingAggregator::new();
    for name in names {
        aggregator.register(*name);
    }
    EventTranslator::new(aggregator)
}

fn notifications() -> Vec<RawNotification> {
    let scheduled = Conditions::none().with(Milestone::Scheduled);
    vec![
        RawNotification::added("a", Conditions::none()),
        RawNotification::modified("a", scheduled),
        RawNotification::modified("a", Conditions::all()),
        RawNotification::modified("a", Conditions::all()),
        RawNotification::added("b", scheduled),
        RawNotification::modified("b", scheduled.with(Milestone::Ready)),
        RawNotification::removed("b"),
    ]
}

/// Every ordering of `items` (Heap's algorithm)
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        for i in 0..k - 1 {
            heap(k - 1, items, out);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
        heap(k - 1, items, out);
    }

    let mut items = items.to_vec();
    let mut out = Vec::new();
    heap(items.len(), &mut items, &mut out);
    out
}

#[test]
fn test_at_most_one_event_per_pod_and_milestone_in_any_order() {
    let expected: HashSet<(String, Milestone)> = [
        ("a", Milestone::Created),
        ("a", Milestone::Scheduled),
        ("a", Milestone::Initialized),
        ("a", Milestone::ContainersReady),
        ("a", Milestone::Ready),
        ("b", Milestone::Created),
        ("b", Milestone::Scheduled),
        ("b", Milestone::Ready),
        ("b", Milestone::Deleted),
    ]
    .into_iter()
    .map(|(name, m)| (name.to_string(), m))
    .collect();

    let orderings = permutations(&notifications());
    assert_eq!(orderings.len(), 5040);

    let t0 = Utc::now();
    for ordering in orderings {
        let mut translator = translator(&["a", "b"]);
        let mut seen: HashMap<(String, Milestone), usize> = HashMap::new();

        for (i, notification) in ordering.iter().enumerate() {
            let now = t0 + Duration::milliseconds(i as i64);
            for event in translator.translate(notification, now) {
                *seen.entry((event.entity, event.milestone)).or_default() += 1;
            }
        }

        assert!(seen.values().all(|count| *count == 1));
        assert_eq!(seen.keys().cloned().collect::<HashSet<_>>(), expected);
    }
}

#[test]
fn test_events_match_recorded_timestamps() {
    let mut translator = translator(&["a"]);
    let t0 = Utc::now();

    let mut events = Vec::new();
    for (i, notification) in notifications().iter().enumerate() {
        events.extend(translator.translate(notification, t0 + Duration::milliseconds(i as i64)));
    }

    let record = translator.aggregator().record("a").unwrap();
    for event in &events {
        assert_eq!(record.get(event.milestone), Some(event.timestamp));
    }

    // Pod "b" was never registered
    assert!(events.iter().all(|event| event.entity == "a"));
    assert!(translator.aggregator().record("b").is_none());
}

#[test]
fn test_condition_events_follow_lifecycle_order() {
    let mut translator = translator(&["a"]);
    let now = Utc::now();

    translator.translate(&RawNotification::added("a", Conditions::none()), now);
    let events = translator.translate(&RawNotification::modified("a", Conditions::all()), now);

    let milestones: Vec<Milestone> = events.iter().map(|event| event.milestone).collect();
    assert_eq!(milestones, Milestone::CONDITIONS.to_vec());
}
