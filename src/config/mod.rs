//! Typed configuration from a TOML file plus environment overrides.
//!
//! Loads once at startup and fails fast on anything that would only break
//! later (bad key length, zero retry budget). Every section has defaults,
//! so a config file only needs the values that differ.
//! Sensitive values are wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::codec;
use crate::delivery::RetryPolicy;
use crate::error::{Error, Result};
use crate::model::Destination;
use crate::telemetry::redact;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub broadcast: BroadcastConfig,
    pub api: ApiConfig,
    pub catalog: CatalogConfig,
    pub payload: PayloadConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Chat platform connection and command handling.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Bot token used for REST calls.
    pub token: SecretString,
    /// REST API base URL.
    pub api_base: String,
    pub command: CommandConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token: SecretString::from(""),
            api_base: "https://discord.com/api/v10".to_string(),
            command: CommandConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub prefix: String,
    /// Channels commands are accepted in. Empty = everywhere.
    pub channels: Vec<u64>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub encrypt: EncryptConfig,
    pub retry: RetryConfig,
}

/// Where already-encrypted envelopes may be picked up from.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub channels: Vec<u64>,
    pub authors: Vec<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub channels: Vec<Destination>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EncryptConfig {
    pub key: SecretString,
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            key: SecretString::from(""),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub pause_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pause_secs: 5,
        }
    }
}

/// Inbound HTTP listener and its API keys.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Accepted API keys. Empty = open mode, every request is authorized.
    pub keys: Vec<SecretString>,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Metadata catalog server.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub url: String,
    pub apikey: SecretString,
    pub timeout_secs: u64,
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9999".to_string(),
            apikey: SecretString::from(""),
            timeout_secs: 5,
        }
    }
}

/// A path-prefix classification rule for downloader items.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryRule {
    pub prefix: PathBuf,
    pub category: String,
    pub module: String,
}

/// Path layout and defaults the payload builder classifies against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Every filesystem-change path must start with this.
    pub gds_root: String,
    /// Extensions rejected for `ADD` (config-file-like files).
    pub rejected_extensions: Vec<String>,
    /// Ordered; first matching prefix wins.
    pub category_rules: Vec<CategoryRule>,
    pub default_category: String,
    pub default_module: String,
    /// Movies under this root are classified as latest releases.
    pub latest_root: PathBuf,
    /// Roots whose first child directory names the genre.
    pub genre_roots: Vec<PathBuf>,
    /// Country names that count as domestic.
    pub korea_names: Vec<String>,
    pub no_poster: String,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            gds_root: "/ROOT/GDRIVE/".to_string(),
            rejected_extensions: vec!["yaml".into(), "yml".into(), "json".into()],
            category_rules: vec![
                CategoryRule {
                    prefix: PathBuf::from("/ROOT/GDRIVE/VIDEO/방송중/외국"),
                    category: "ftv".into(),
                    module: "vod".into(),
                },
                CategoryRule {
                    prefix: PathBuf::from("/ROOT/GDRIVE/VIDEO/영화"),
                    category: "movie".into(),
                    module: "share_movie".into(),
                },
            ],
            default_category: "ktv".into(),
            default_module: "vod".into(),
            latest_root: PathBuf::from("/ROOT/GDRIVE/VIDEO/영화/최신"),
            genre_roots: vec![
                PathBuf::from("/ROOT/GDRIVE/VIDEO/방송중/외국"),
                PathBuf::from("/ROOT/GDRIVE/VIDEO/방송중"),
                PathBuf::from("/ROOT/GDRIVE/VIDEO/방송중(기타)"),
            ],
            korea_names: vec!["한국".into(), "대한민국".into(), "Korea".into()],
            no_poster: "https://dummyimage.com/200x300/000/fff.jpg&text=No+Image".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// OTLP endpoint (e.g. "http://localhost:4317"). None = local fmt only.
    pub otel_endpoint: Option<String>,
    pub redacted_patterns: Vec<String>,
    pub redacted_substitute: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            otel_endpoint: None,
            redacted_patterns: vec![
                r#"['"]?(?:apikey|X-Plex-Token|token)['"]?\s*[:=]\s*['"]?([^'"&\s,{}]+)['"]?"#
                    .to_string(),
                r"webhooks/([^/\s]+)/([^/\s]+)".to_string(),
                r"Bot ([A-Za-z0-9._\-]+)".to_string(),
            ],
            redacted_substitute: "<REDACTED>".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration: file, then environment, then validation.
    ///
    /// With no explicit path, `relay.toml` in the working directory is used
    /// if present; otherwise defaults. In local dev, call
    /// `dotenvy::dotenv().ok()` before this.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without env overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Override secrets and deployment values from the environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("RELAY_DISCORD_TOKEN") {
            self.chat.token = SecretString::from(token);
        }
        if let Some(key) = var("RELAY_ENCRYPT_KEY") {
            self.broadcast.encrypt.key = SecretString::from(key);
        }
        if let Some(apikey) = var("RELAY_CATALOG_APIKEY") {
            self.catalog.apikey = SecretString::from(apikey);
        }
        if let Some(keys) = var("RELAY_API_KEYS") {
            self.api.keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(SecretString::from)
                .collect();
        }
        if let Some(level) = var("RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(endpoint) = var("OTEL_ENDPOINT") {
            self.logging.otel_endpoint = Some(endpoint);
        }
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        codec::validate_key(self.broadcast.encrypt.key.expose_secret())
            .map_err(|e| Error::Config(format!("broadcast.encrypt.key: {e}")))?;
        if self.broadcast.retry.max_attempts == 0 {
            return Err(Error::Config(
                "broadcast.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(Error::Config(
                "catalog.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.api.port == 0 {
            return Err(Error::Config("api.port must not be 0".to_string()));
        }
        if self
            .api
            .keys
            .iter()
            .any(|k| k.expose_secret().is_empty())
        {
            return Err(Error::Config("api.keys must not contain empty keys".to_string()));
        }
        for pattern in &self.logging.redacted_patterns {
            redact::compile_pattern(pattern)
                .map_err(|e| Error::Config(format!("logging.redacted_patterns: {e}")))?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.broadcast.retry.max_attempts,
            pause: Duration::from_secs(self.broadcast.retry.pause_secs),
        }
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.broadcast.target.channels
    }
}
