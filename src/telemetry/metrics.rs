//! Metric instrument factories for relay-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"relay-rs"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for relay-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("relay-rs")
}

/// Counter: events accepted into the relay queue.
/// Labels: `kind` ("gds" | "downloader").
pub fn events_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("relay.events.enqueued")
        .with_description("Number of events accepted into the relay queue")
        .build()
}

/// Counter: individual send attempts against a destination.
pub fn delivery_attempts() -> Counter<u64> {
    meter()
        .u64_counter("relay.delivery.attempts")
        .with_description("Number of message send attempts")
        .build()
}

/// Counter: final per-destination delivery outcomes.
/// Labels: `outcome` ("delivered" | "exhausted" | "failed" | "skipped").
pub fn delivery_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("relay.delivery.outcomes")
        .with_description("Per-destination delivery outcomes")
        .build()
}

/// Counter: catalog lookups made while building payloads.
/// Labels: `result` ("ok" | "error" | "timeout").
pub fn catalog_lookups() -> Counter<u64> {
    meter()
        .u64_counter("relay.catalog.lookups")
        .with_description("Number of catalog metadata lookups")
        .build()
}
