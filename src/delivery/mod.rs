//! Delivery of encrypted envelopes to every configured destination.
//!
//! Each destination is handled independently: one failing destination never
//! blocks the others. Per destination, a send is retried only when the sink
//! reports a transient (server-side) failure, with a fixed pause between
//! attempts. Outcomes are logged here and returned for inspection; they are
//! never surfaced to whoever produced the event.

pub mod discord;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::model::Destination;
use crate::telemetry::metrics;

/// Result class of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Server-side failure. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Anything else. Retrying will not help.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Destination does not exist or cannot be written to.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
}

/// Something that can put a message into a destination.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(&self, destination: Destination, content: &str)
    -> Result<(), SendError>;
}

/// Fixed retry policy for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. At least 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pause: Duration::from_secs(5),
        }
    }
}

/// Final outcome for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last_error: String },
    /// A non-retryable failure ended the attempts.
    Failed { attempts: u32, reason: String },
    /// Destination could not be resolved; nothing was sent.
    Skipped { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts }
            | DeliveryOutcome::Exhausted { attempts, .. }
            | DeliveryOutcome::Failed { attempts, .. } => *attempts,
            DeliveryOutcome::Skipped { .. } => 0,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Exhausted { .. } => "exhausted",
            DeliveryOutcome::Failed { .. } => "failed",
            DeliveryOutcome::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub destination: Destination,
    pub outcome: DeliveryOutcome,
}

/// Fans an envelope out to a static destination set.
#[derive(Clone)]
pub struct Delivery {
    sink: Arc<dyn MessageSink>,
    destinations: Arc<[Destination]>,
    policy: RetryPolicy,
}

impl Delivery {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        destinations: impl Into<Arc<[Destination]>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            sink,
            destinations: destinations.into(),
            policy,
        }
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Send to every configured destination.
    pub async fn broadcast(&self, envelope: &str) -> Vec<DeliveryReport> {
        let destinations = Arc::clone(&self.destinations);
        self.send(envelope, &destinations).await
    }

    /// Send to each of `destinations` in order, independently.
    pub async fn send(&self, envelope: &str, destinations: &[Destination]) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(destinations.len());
        for &destination in destinations {
            let outcome = self.send_one(envelope, destination).await;
            metrics::delivery_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);
            reports.push(DeliveryReport {
                destination,
                outcome,
            });
        }
        reports
    }

    async fn send_one(&self, envelope: &str, destination: Destination) -> DeliveryOutcome {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics::delivery_attempts().add(1, &[]);
            debug!(%destination, attempt, "sending envelope");

            match self.sink.send_message(destination, envelope).await {
                Ok(()) => return DeliveryOutcome::Delivered { attempts: attempt },
                Err(SendError::UnknownDestination(reason)) => {
                    warn!(%destination, %reason, "destination unavailable, skipping");
                    return DeliveryOutcome::Skipped { reason };
                }
                Err(SendError::Permanent(reason)) => {
                    error!(%destination, attempt, %reason, "send failed, not retrying");
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        reason,
                    };
                }
                Err(SendError::Transient(reason)) => {
                    error!(%destination, attempt, max, %reason, "send failed");
                    if attempt >= max {
                        error!(%destination, "maximum retry count exceeded");
                        return DeliveryOutcome::Exhausted {
                            attempts: attempt,
                            last_error: reason,
                        };
                    }
                    tokio::time::sleep(self.policy.pause).await;
                }
            }
        }
    }
}
