//! The relay worker: pops events in order, builds, encrypts and delivers.
//!
//! Exactly one worker drains a queue. A failure (or panic) while handling
//! one event is logged and the loop moves on to the next. On shutdown the
//! pending pop is interrupted; an event already in flight finishes its
//! delivery attempt before the loop exits.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::queue::QueueReceiver;
use crate::codec::Codec;
use crate::delivery::{Delivery, DeliveryReport};
use crate::error::Result;
use crate::model::{Event, WorkerState};
use crate::payload::PayloadBuilder;
use crate::telemetry::relay::{record_stage, start_event_span};

/// Build → encrypt → deliver for one event.
pub struct Pipeline {
    builder: PayloadBuilder,
    codec: Codec,
    delivery: Delivery,
}

impl Pipeline {
    pub fn new(builder: PayloadBuilder, codec: Codec, delivery: Delivery) -> Self {
        Self {
            builder,
            codec,
            delivery,
        }
    }

    pub async fn process(&self, event: &Event) -> Result<Vec<DeliveryReport>> {
        let span = tracing::Span::current();

        record_stage(&span, "build");
        let payload = self.builder.build(event).await;
        let json = payload.to_json()?;
        debug!(bytes = json.len(), "payload built");

        record_stage(&span, "encrypt");
        let envelope = self.codec.seal(&json);

        record_stage(&span, "deliver");
        Ok(self.delivery.broadcast(&envelope).await)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Shared view of a worker: observe its state, ask it to stop.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    state: Arc<AtomicU8>,
    shutdown: Arc<Notify>,
}

impl WorkerHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(encode(WorkerState::Stopped))),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> WorkerState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Signal the worker to stop after its in-flight event, if any.
    pub fn shutdown(&self) {
        let _ = self.state.compare_exchange(
            encode(WorkerState::Running),
            encode(WorkerState::Draining),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.shutdown.notify_one();
    }

    fn set(&self, to: WorkerState) {
        let from = self.state();
        if from.can_transition_to(to) {
            self.state.store(encode(to), Ordering::Release);
            debug!(%from, %to, "worker state");
        }
    }
}

fn encode(state: WorkerState) -> u8 {
    match state {
        WorkerState::Stopped => 0,
        WorkerState::Running => 1,
        WorkerState::Draining => 2,
    }
}

fn decode(raw: u8) -> WorkerState {
    match raw {
        1 => WorkerState::Running,
        2 => WorkerState::Draining,
        _ => WorkerState::Stopped,
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct RelayWorker {
    pipeline: Arc<Pipeline>,
    receiver: Option<QueueReceiver>,
    handle: WorkerHandle,
    task: Option<JoinHandle<()>>,
}

impl RelayWorker {
    pub fn new(receiver: QueueReceiver, pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            receiver: Some(receiver),
            handle: WorkerHandle::new(),
            task: None,
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.handle.state()
    }

    /// Spawn the worker task. Returns `false` without doing anything if it
    /// was already started.
    pub fn start(&mut self) -> bool {
        let Some(receiver) = self.receiver.take() else {
            debug!("relay worker already started");
            return false;
        };
        self.handle.set(WorkerState::Running);
        let task = tokio::spawn(run(Arc::clone(&self.pipeline), receiver, self.handle.clone()));
        self.task = Some(task);
        true
    }

    /// Signal shutdown and wait for the task to finish.
    pub async fn stop(&mut self) {
        self.handle.shutdown();
        self.join().await;
    }

    /// Wait for the task to finish without signalling it.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!("relay worker task failed: {e}");
        }
    }
}

async fn run(pipeline: Arc<Pipeline>, mut receiver: QueueReceiver, handle: WorkerHandle) {
    info!("relay worker started");

    loop {
        let event = tokio::select! {
            biased;
            _ = handle.shutdown.notified() => {
                info!(pending = receiver.len(), "relay worker shutting down");
                break;
            }
            event = receiver.pop() => match event {
                Some(event) => event,
                None => {
                    info!("relay queue closed");
                    break;
                }
            }
        };

        let span = start_event_span(event.kind.label(), &event.id);
        let outcome = AssertUnwindSafe(pipeline.process(&event).instrument(span.clone()))
            .catch_unwind()
            .await;

        span.in_scope(|| match outcome {
            Ok(Ok(reports)) => {
                let delivered = reports.iter().filter(|r| r.outcome.is_delivered()).count();
                info!(
                    path = %event.path,
                    delivered,
                    destinations = reports.len(),
                    "event relayed"
                );
            }
            Ok(Err(e)) => error!(path = %event.path, "failed to relay event: {e}"),
            Err(_) => error!(path = %event.path, "relay of event panicked"),
        });

        if handle.state() == WorkerState::Draining {
            info!(pending = receiver.len(), "relay worker drained in-flight event");
            break;
        }
    }

    receiver.close();
    if !receiver.is_empty() {
        warn!(dropped = receiver.len(), "queued events dropped at shutdown");
    }
    handle.set(WorkerState::Stopped);
    info!("relay worker stopped");
}
