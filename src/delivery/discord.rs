//! Discord REST sink.
//!
//! Posts messages to channels through the bot REST API and maps responses
//! onto the delivery failure classes:
//! - 2xx: delivered
//! - 5xx, 429, timeouts and connect errors: transient
//! - 403/404: unknown destination (not joined, deleted, not messageable)
//! - everything else: permanent

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::warn;

use super::{MessageSink, SendError};
use crate::config::ChatConfig;
use crate::model::Destination;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct DiscordSink {
    api_base: String,
    token: SecretString,
    client: Client,
}

impl DiscordSink {
    pub fn new(config: &ChatConfig) -> crate::error::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: SecretString::from(config.token.expose_secret()),
            client,
        })
    }

    fn message_url(&self, destination: Destination) -> String {
        format!("{}/channels/{}/messages", self.api_base, destination)
    }
}

/// Map an HTTP status onto a send result.
pub fn classify_status(status: StatusCode, body: &str) -> Result<(), SendError> {
    if status.is_success() {
        return Ok(());
    }
    let detail = format!("{status}: {body}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(SendError::Transient(detail))
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
        Err(SendError::UnknownDestination(detail))
    } else {
        Err(SendError::Permanent(detail))
    }
}

fn classify_transport(err: &reqwest::Error) -> SendError {
    if err.is_timeout() || err.is_connect() {
        SendError::Transient(err.to_string())
    } else {
        SendError::Permanent(err.to_string())
    }
}

#[async_trait]
impl MessageSink for DiscordSink {
    async fn send_message(
        &self,
        destination: Destination,
        content: &str,
    ) -> Result<(), SendError> {
        let response = self
            .client
            .post(self.message_url(destination))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.token.expose_secret()),
            )
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%destination, %status, "discord rejected message");
        classify_status(status, &body)
    }
}
