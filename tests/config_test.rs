use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use relay_rs::config::Config;
use relay_rs::model::Destination;
use secrecy::ExposeSecret;

const VALID_KEY: &str = "0123456789abcdef";

fn with_key(toml: &str) -> String {
    format!("[broadcast.encrypt]\nkey = \"{VALID_KEY}\"\n{toml}")
}

#[test]
fn empty_file_gets_defaults() {
    let config = Config::from_toml_str("").unwrap();

    assert_eq!(config.chat.command.prefix, "!");
    assert_eq!(config.api.host, "0.0.0.0");
    assert_eq!(config.api.port, 8080);
    assert!(config.api.keys.is_empty());
    assert_eq!(config.catalog.timeout(), Duration::from_secs(5));
    assert_eq!(config.payload.gds_root, "/ROOT/GDRIVE/");
    assert_eq!(config.retry_policy().max_attempts, 3);
    assert_eq!(config.retry_policy().pause, Duration::from_secs(5));
    assert_eq!(config.logging.redacted_substitute, "<REDACTED>");
}

#[test]
fn file_values_override_defaults_section_by_section() {
    let config = Config::from_toml_str(&with_key(
        r#"
[broadcast.target]
channels = [111, 222]

[broadcast.retry]
max_attempts = 5

[api]
keys = ["k1", "k2"]
port = 9000

[[payload.category_rules]]
prefix = "/ROOT/GDRIVE/ANI"
category = "ftv"
module = "vod"
"#,
    ))
    .unwrap();

    assert_eq!(config.destinations(), &[Destination(111), Destination(222)]);
    assert_eq!(config.retry_policy().max_attempts, 5);
    assert_eq!(config.retry_policy().pause, Duration::from_secs(5));
    assert_eq!(config.api.keys.len(), 2);
    assert_eq!(config.api.port, 9000);
    assert_eq!(config.api.host, "0.0.0.0");
    assert_eq!(config.payload.category_rules.len(), 1);
    assert_eq!(config.payload.default_category, "ktv");
    config.validate().unwrap();
}

#[test]
fn env_overrides_secrets() {
    let env: HashMap<&str, &str> = [
        ("RELAY_ENCRYPT_KEY", VALID_KEY),
        ("RELAY_API_KEYS", "a, b,,c"),
        ("RELAY_DISCORD_TOKEN", "bot-token"),
        ("OTEL_ENDPOINT", "http://localhost:4317"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config.apply_env(|name| env.get(name).map(|v| v.to_string()));

    assert_eq!(config.broadcast.encrypt.key.expose_secret(), VALID_KEY);
    let keys: Vec<_> = config.api.keys.iter().map(|k| k.expose_secret().to_string()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(config.chat.token.expose_secret(), "bot-token");
    assert_eq!(config.logging.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    config.validate().unwrap();
}

#[test]
fn validation_rejects_unusable_settings() {
    // No key at all.
    assert!(Config::default().validate().is_err());

    let bad_key = Config::from_toml_str("[broadcast.encrypt]\nkey = \"fifteen-bytes!!\"").unwrap();
    assert!(bad_key.validate().is_err());

    let zero_attempts =
        Config::from_toml_str(&with_key("[broadcast.retry]\nmax_attempts = 0")).unwrap();
    assert!(zero_attempts.validate().is_err());

    let zero_timeout =
        Config::from_toml_str(&with_key("[catalog]\ntimeout_secs = 0")).unwrap();
    assert!(zero_timeout.validate().is_err());

    let zero_port = Config::from_toml_str(&with_key("[api]\nport = 0")).unwrap();
    assert!(zero_port.validate().is_err());

    let bad_pattern =
        Config::from_toml_str(&with_key("[logging]\nredacted_patterns = [\"(unclosed\"]")).unwrap();
    assert!(bad_pattern.validate().is_err());
}

#[test]
fn load_reads_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", with_key("[api]\nport = 8181")).unwrap();

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.api.port, 8181);
}

#[test]
fn load_fails_for_missing_explicit_file() {
    let missing = std::path::Path::new("/nonexistent/relay.toml");
    assert!(Config::load(Some(missing)).is_err());
}

#[test]
fn malformed_toml_is_a_config_error() {
    assert!(Config::from_toml_str("[api\nport = ").is_err());
}
