//! Ordered, unbounded event queue.
//!
//! Any number of ingestion points push through cloned [`RelayQueue`]
//! handles; exactly one [`QueueReceiver`] exists and belongs to the worker.
//! Events come out in the order they went in. No dedup, no priority.

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tracing::debug;

use super::EventSink;
use crate::error::{Error, Result};
use crate::model::Event;
use crate::telemetry::metrics;

/// Producer handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RelayQueue {
    tx: mpsc::UnboundedSender<Event>,
}

/// Consumer side. Not cloneable: one worker per queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl RelayQueue {
    /// Create a queue and its single receiver.
    pub fn new() -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, QueueReceiver { rx })
    }

    /// Append an event. Fails only once the receiver is gone.
    pub fn push(&self, event: Event) -> Result<()> {
        let kind = event.kind.label();
        debug!(event_id = %event.id, kind, path = %event.path, "enqueue");
        self.tx.send(event).map_err(|_| Error::QueueClosed)?;
        metrics::events_enqueued().add(1, &[KeyValue::new("kind", kind)]);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventSink for RelayQueue {
    fn push_event(&self, event: Event) -> Result<()> {
        self.push(event)
    }
}

impl QueueReceiver {
    /// Wait for the next event. `None` once every producer is dropped and
    /// the queue is drained.
    pub async fn pop(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Events waiting to be popped.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stop accepting new events; already queued ones can still be popped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
