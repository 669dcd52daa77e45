//! relay CLI: run the relay, or poke at its envelopes.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_rs::codec::Codec;
use relay_rs::config::Config;
use relay_rs::service::RelayService;
use relay_rs::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "relay", about = "Encrypted change-notification relay")]
struct Cli {
    /// Config file (defaults to ./relay.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay worker and HTTP API
    Serve,
    /// Encrypt text into a fenced envelope
    Encrypt {
        /// Plaintext to encrypt
        text: String,
    },
    /// Decrypt an envelope (fence optional)
    Decrypt {
        /// Envelope or bare base64 payload
        envelope: String,
    },
    /// Load and validate configuration, then print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => cmd_serve(config).await,
        Command::Encrypt { text } => {
            let codec = Codec::new(&config.broadcast.encrypt.key)?;
            println!("{}", codec.seal(&text));
            Ok(())
        }
        Command::Decrypt { envelope } => {
            let codec = Codec::new(&config.broadcast.encrypt.key)?;
            println!("{}", codec.open(envelope.trim())?);
            Ok(())
        }
        Command::CheckConfig => cmd_check_config(&config),
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_logging(&config.logging)?)?;

    let service = RelayService::from_config(&config)?;
    service
        .run(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    println!("Config OK");
    println!(
        "API:          {}:{} ({} key(s))",
        config.api.host,
        config.api.port,
        config.api.keys.len()
    );
    println!(
        "Destinations: {}",
        config
            .destinations()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "Retry:        {} attempt(s), {}s pause",
        config.broadcast.retry.max_attempts, config.broadcast.retry.pause_secs
    );
    println!("Catalog:      {}", config.catalog.url);
    println!(
        "Encrypt key:  {} bytes",
        config.broadcast.encrypt.key.expose_secret().len()
    );
    println!(
        "Chat token:   {}",
        if config.chat.token.expose_secret().is_empty() {
            "missing"
        } else {
            "set"
        }
    );
    Ok(())
}
