//! Chat-side ingestion.
//!
//! Two kinds of messages matter. A fenced envelope posted by a trusted
//! author in a source channel is forwarded verbatim to every destination.
//! A prefixed command (`!add`, `!rm-file`, `!rm-folder`, `!refresh`) with
//! `|`-separated paths is validated and turns into filesystem events on
//! the relay queue. The connection to the chat platform lives outside this
//! module; it hands messages in and posts back the replies returned here.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec;
use crate::config::{CommandConfig, PayloadConfig, SourceConfig};
use crate::delivery::{Delivery, DeliveryReport};
use crate::model::{Event, ScanMode};
use crate::relay::EventSink;

/// Command verbs and the scan mode each one broadcasts.
pub const COMMANDS: &[(&str, ScanMode)] = &[
    ("add", ScanMode::Add),
    ("rm-file", ScanMode::RemoveFile),
    ("rm-folder", ScanMode::RemoveFolder),
    ("refresh", ScanMode::Refresh),
];

const REPLY_MISSING_PATH: &str = "경로를 입력해 주세요.";
const REPLY_UNRECOGNIZED: &str = "경로를 인식할 수 없습니다.";
const REPLY_INVALID: &str = "경로 및 파일 형식을 확인해 주세요.";
const REPLY_QUEUED: &str = "방송 대기열에 추가했습니다.";
const REPLY_CANNOT_RUN: &str = "명령을 실행할 수 없습니다.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub channel_id: u64,
    pub author_id: u64,
    pub content: String,
}

/// What handling one message did.
#[derive(Debug)]
pub enum ChatOutcome {
    /// Not addressed to the relay.
    Ignored,
    /// An envelope was forwarded to every destination.
    Rebroadcast(Vec<DeliveryReport>),
    /// A command ran; post these replies back to the channel.
    Replied(Vec<String>),
}

/// Result of validating and enqueueing one command's paths.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub queued: Vec<String>,
    pub invalid: Vec<String>,
}

impl CommandReport {
    pub fn replies(&self) -> Vec<String> {
        let mut replies = Vec::new();
        if !self.invalid.is_empty() {
            replies.push(format!("{REPLY_INVALID}```{}```", self.invalid.join("\n")));
        }
        if !self.queued.is_empty() {
            replies.push(format!("{REPLY_QUEUED}```{}```", self.queued.join("\n")));
        }
        replies
    }
}

pub struct ChatHandler {
    prefix: String,
    command_channels: Vec<u64>,
    source_channels: Vec<u64>,
    source_authors: Vec<u64>,
    gds_root: String,
    rejected_extensions: Vec<String>,
    sink: Arc<dyn EventSink>,
    delivery: Delivery,
}

impl ChatHandler {
    pub fn new(
        command: &CommandConfig,
        source: &SourceConfig,
        paths: &PayloadConfig,
        sink: Arc<dyn EventSink>,
        delivery: Delivery,
    ) -> Self {
        Self {
            prefix: command.prefix.clone(),
            command_channels: command.channels.clone(),
            source_channels: source.channels.clone(),
            source_authors: source.authors.clone(),
            gds_root: paths.gds_root.clone(),
            rejected_extensions: paths
                .rejected_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            sink,
            delivery,
        }
    }

    pub async fn on_message(&self, message: &ChatMessage) -> ChatOutcome {
        if self.is_trusted_envelope(message) {
            info!(
                channel = message.channel_id,
                author = message.author_id,
                "rebroadcasting envelope"
            );
            return ChatOutcome::Rebroadcast(self.delivery.broadcast(&message.content).await);
        }

        let Some(body) = message.content.strip_prefix(self.prefix.as_str()) else {
            return ChatOutcome::Ignored;
        };
        if !self.command_allowed(message.channel_id) {
            debug!(channel = message.channel_id, "command outside command channels");
            return ChatOutcome::Ignored;
        }

        let (verb, args) = match body.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (body.trim(), ""),
        };
        let Some(mode) = lookup_command(verb) else {
            warn!(author = message.author_id, verb, "unknown command");
            return ChatOutcome::Replied(vec![REPLY_CANNOT_RUN.to_string()]);
        };

        ChatOutcome::Replied(self.run_command(mode, args, message.author_id))
    }

    /// Validate `|`-separated paths and enqueue the valid ones.
    pub fn run_command(&self, mode: ScanMode, args: &str, author: u64) -> Vec<String> {
        if args.is_empty() {
            return vec![REPLY_MISSING_PATH.to_string()];
        }
        let targets: Vec<&str> = args.split('|').map(str::trim).filter(|t| !t.is_empty()).collect();
        if targets.is_empty() {
            return vec![REPLY_UNRECOGNIZED.to_string()];
        }
        self.enqueue_paths(mode, &targets, author).replies()
    }

    pub fn enqueue_paths(&self, mode: ScanMode, targets: &[&str], author: u64) -> CommandReport {
        let mut report = CommandReport::default();
        for &target in targets {
            if !self.path_allowed(mode, target) {
                report.invalid.push(target.to_string());
                continue;
            }
            debug!(author, %mode, path = target, "queueing command path");
            match self.sink.push_event(Event::filesystem(target, mode)) {
                Ok(()) => report.queued.push(target.to_string()),
                Err(e) => {
                    warn!(path = target, "failed to queue path: {e}");
                    report.invalid.push(target.to_string());
                }
            }
        }
        report
    }

    /// Rooted under the storage mount, and not a config-like file when adding.
    pub fn path_allowed(&self, mode: ScanMode, target: &str) -> bool {
        if mode == ScanMode::Add && self.is_rejected_file(target) {
            return false;
        }
        target.starts_with(&self.gds_root)
    }

    fn is_rejected_file(&self, target: &str) -> bool {
        let path = Path::new(target);
        let has_stem = path.file_stem().is_some_and(|s| !s.is_empty());
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        has_stem && ext.is_some_and(|ext| self.rejected_extensions.contains(&ext))
    }

    fn is_trusted_envelope(&self, message: &ChatMessage) -> bool {
        self.source_channels.contains(&message.channel_id)
            && self.source_authors.contains(&message.author_id)
            && codec::is_envelope(&message.content)
    }

    fn command_allowed(&self, channel: u64) -> bool {
        self.command_channels.is_empty() || self.command_channels.contains(&channel)
    }
}

pub fn lookup_command(verb: &str) -> Option<ScanMode> {
    COMMANDS
        .iter()
        .find(|(name, _)| *name == verb)
        .map(|&(_, mode)| mode)
}
