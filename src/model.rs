//! Core data model.
//!
//! An event is one detected change that needs relaying. It has identity,
//! a kind with its kind-specific field, and optional size hints.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A unit of relay work. Immutable once admitted to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier, for log correlation only.
    pub id: EventId,

    /// Absolute logical path of the affected resource.
    pub path: String,

    /// What kind of change this is, with its kind-specific field.
    pub kind: EventKind,

    /// Number of files the change covers. Defaults to 1.
    pub file_count: u64,

    /// Total size in bytes. Defaults to 0.
    pub total_size: u64,

    pub received_at: DateTime<Utc>,
}

impl Event {
    /// A storage-mount change (`gds` broadcast).
    pub fn filesystem(path: impl Into<String>, mode: ScanMode) -> Self {
        Self::with_kind(path, EventKind::FilesystemChange { mode })
    }

    /// A new item from the downloader.
    pub fn downloader(path: impl Into<String>, item: impl Into<String>) -> Self {
        Self::with_kind(path, EventKind::DownloaderItem { item: item.into() })
    }

    fn with_kind(path: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            path: path.into(),
            kind,
            file_count: 1,
            total_size: 0,
            received_at: Utc::now(),
        }
    }

    pub fn file_count(mut self, count: u64) -> Self {
        self.file_count = count;
        self
    }

    pub fn total_size(mut self, size: u64) -> Self {
        self.total_size = size;
        self
    }
}

/// Newtype for event IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    FilesystemChange { mode: ScanMode },
    DownloaderItem { item: String },
}

impl EventKind {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::FilesystemChange { .. } => "gds",
            EventKind::DownloaderItem { .. } => "downloader",
        }
    }
}

/// Scan mode understood by the receiving side of a `gds` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanMode {
    Add,
    RemoveFile,
    RemoveFolder,
    Refresh,
}

impl ScanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Add => "ADD",
            ScanMode::RemoveFile => "REMOVE_FILE",
            ScanMode::RemoveFolder => "REMOVE_FOLDER",
            ScanMode::Refresh => "REFRESH",
        }
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(ScanMode::Add),
            "REMOVE_FILE" => Ok(ScanMode::RemoveFile),
            "REMOVE_FOLDER" => Ok(ScanMode::RemoveFolder),
            "REFRESH" => Ok(ScanMode::Refresh),
            other => Err(format!("unknown scan mode: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// An output channel identifier, resolved by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(pub u64);

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Worker state
// ---------------------------------------------------------------------------

/// Lifecycle of the relay worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Not started yet, or finished. Terminal once the worker has run.
    Stopped,
    /// Popping and processing events.
    Running,
    /// Shutdown requested; finishing the in-flight event.
    Draining,
}

impl WorkerState {
    pub fn can_transition_to(self, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, to),
            (Stopped, Running) | (Running, Draining) | (Running, Stopped) | (Draining, Stopped)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
        };
        write!(f, "{s}")
    }
}
