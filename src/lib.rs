//! # relay-rs
//!
//! Ordered, encrypted relay of storage and downloader change notifications.
//!
//! Events arrive from chat commands and an HTTP API, wait in one FIFO queue,
//! and are turned into JSON documents (enriched from a metadata catalog),
//! encrypted into fenced envelopes, and posted to every configured chat
//! destination with bounded retry.

pub mod api;
pub mod chat;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod error;
pub mod model;
pub mod payload;
pub mod relay;
pub mod service;
pub mod telemetry;
