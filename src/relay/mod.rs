//! Relay core: the ordered queue and the single worker that drains it.

pub mod queue;
pub mod worker;

pub use queue::{QueueReceiver, RelayQueue};
pub use worker::{RelayWorker, WorkerHandle};

use crate::error::Result;
use crate::model::Event;

/// Anything events can be handed to for relaying.
///
/// Ingestion surfaces (HTTP, chat commands) depend on this, not on the
/// queue type, so tests can swap in their own sink.
pub trait EventSink: Send + Sync {
    fn push_event(&self, event: Event) -> Result<()>;
}
