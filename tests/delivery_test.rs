//! Integration tests for per-destination delivery and retry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_rs::delivery::{Delivery, DeliveryOutcome, MessageSink, RetryPolicy, SendError};
use relay_rs::model::Destination;

/// Sink that replays scripted results per destination, then succeeds.
#[derive(Default)]
struct ScriptedSink {
    script: Mutex<HashMap<u64, VecDeque<Result<(), SendError>>>>,
    calls: Mutex<Vec<(u64, String)>>,
}

impl ScriptedSink {
    fn script(self, destination: u64, results: Vec<Result<(), SendError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(destination, results.into());
        self
    }

    fn calls_to(&self, destination: u64) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == destination)
            .count()
    }
}

#[async_trait]
impl MessageSink for ScriptedSink {
    async fn send_message(&self, destination: Destination, content: &str) -> Result<(), SendError> {
        self.calls
            .lock()
            .unwrap()
            .push((destination.0, content.to_string()));
        self.script
            .lock()
            .unwrap()
            .get_mut(&destination.0)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

fn transient() -> Result<(), SendError> {
    Err(SendError::Transient("503 Service Unavailable".into()))
}

fn delivery(sink: Arc<ScriptedSink>, destinations: &[u64]) -> Delivery {
    let destinations: Vec<Destination> = destinations.iter().copied().map(Destination).collect();
    Delivery::new(sink, destinations, RetryPolicy::default())
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let sink = Arc::new(ScriptedSink::default().script(1, vec![transient(), transient(), Ok(())]));
    let delivery = delivery(Arc::clone(&sink), &[1]);

    let started = tokio::time::Instant::now();
    let reports = delivery.broadcast("```^abc```").await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, DeliveryOutcome::Delivered { attempts: 3 });
    assert_eq!(sink.calls_to(1), 3);
    // Two pauses between three attempts.
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn exhausting_attempts_is_final() {
    let sink = Arc::new(
        ScriptedSink::default().script(1, vec![transient(), transient(), transient(), Ok(())]),
    );
    let delivery = delivery(Arc::clone(&sink), &[1]);

    let reports = delivery.broadcast("payload").await;

    assert!(matches!(
        reports[0].outcome,
        DeliveryOutcome::Exhausted { attempts: 3, .. }
    ));
    assert_eq!(sink.calls_to(1), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_not_retried() {
    let sink = Arc::new(
        ScriptedSink::default().script(1, vec![Err(SendError::Permanent("400 Bad Request".into()))]),
    );
    let delivery = delivery(Arc::clone(&sink), &[1]);

    let reports = delivery.broadcast("payload").await;

    assert!(matches!(
        reports[0].outcome,
        DeliveryOutcome::Failed { attempts: 1, .. }
    ));
    assert_eq!(sink.calls_to(1), 1);
}

// ---------------------------------------------------------------------------
// Independence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unknown_destination_is_skipped_and_others_still_delivered() {
    let sink = Arc::new(
        ScriptedSink::default()
            .script(1, vec![Err(SendError::UnknownDestination("404 Unknown Channel".into()))])
            .script(2, vec![transient(), Ok(())]),
    );
    let delivery = delivery(Arc::clone(&sink), &[1, 2, 3]);

    let reports = delivery.broadcast("payload").await;

    let outcomes: Vec<_> = reports.iter().map(|r| (r.destination.0, r.outcome.clone())).collect();
    assert!(matches!(outcomes[0], (1, DeliveryOutcome::Skipped { .. })));
    assert_eq!(outcomes[1], (2, DeliveryOutcome::Delivered { attempts: 2 }));
    assert_eq!(outcomes[2], (3, DeliveryOutcome::Delivered { attempts: 1 }));
    assert_eq!(reports[0].outcome.attempts(), 0);
    assert_eq!(sink.calls_to(1), 1);
}

#[tokio::test]
async fn send_uses_only_given_destinations_with_same_content() {
    let sink = Arc::new(ScriptedSink::default());
    let delivery = delivery(Arc::clone(&sink), &[1, 2]);

    let reports = delivery.send("```^xyz```", &[Destination(9)]).await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].outcome.is_delivered());
    let calls = sink.calls.lock().unwrap();
    assert_eq!(*calls, vec![(9, "```^xyz```".to_string())]);
    assert_eq!(delivery.destinations(), &[Destination(1), Destination(2)]);
}
