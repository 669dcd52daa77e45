//! Relay span helpers.
//!
//! One span per event handled by the worker; the current pipeline stage is
//! recorded on it as the event moves through build, encrypt and deliver.

use tracing::Span;

use crate::model::EventId;

/// Start a span for relaying one event.
///
/// The `relay.stage` field is declared empty and updated via [`record_stage`].
pub fn start_event_span(kind: &str, event_id: &EventId) -> Span {
    tracing::info_span!(
        "relay.event",
        "relay.kind" = kind,
        "event_id" = %event_id,
        "relay.stage" = tracing::field::Empty,
    )
}

/// Record the stage an event has entered on its span.
pub fn record_stage(span: &Span, stage: &str) {
    span.record("relay.stage", stage);
    span.in_scope(|| {
        tracing::debug!(stage, "relay_stage");
    });
}
