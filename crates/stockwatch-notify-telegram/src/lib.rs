// # Telegram Notification Channel
//
// Delivers monitor messages through the Telegram Bot API.
//
// ## API Reference
//
// - Bot API: https://core.telegram.org/bots/api
// - Send message: POST `/bot<token>/sendMessage`
//   with `{ "chat_id": ..., "text": ..., "parse_mode": "Markdown" }`
//
// ## Behavior
//
// One POST per `deliver()`. The reply's `ok` flag is the delivery result:
// a refused message (bad chat id, malformed markup) is `Ok(false)`. Transport
// failures, rate limiting and server errors are `Err`. Timeouts and retry
// policy belong to the core `Notifier`.
//
// ## Security
//
// The bot token is part of the request path. It never appears in logs, error
// messages or `Debug` output.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stockwatch_core::config::ChannelConfig;
use stockwatch_core::traits::{NotificationChannel, NotificationChannelFactory};
use stockwatch_core::{ComponentRegistry, Error, Result};

/// Telegram Bot API base URL
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Transport-level timeout; the notifier applies its own, usually shorter
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram notification channel
///
/// Stateless apart from the HTTP client: destination and token arrive with
/// each delivery, so one instance serves any number of chats.
pub struct TelegramChannel {
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramChannel {
    pub fn new() -> Self {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    /// Point the channel at another Bot API server (self-hosted or test)
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { api_base, client }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn send_message_url(&self, token: &str) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, token)
    }
}

impl Default for TelegramChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an API reply to a delivery result
///
/// Client errors carrying a well-formed reply are refusals. Rate limiting,
/// server errors and unreadable replies are failures.
fn interpret_reply(status: u16, body: &str) -> Result<bool> {
    match status {
        429 => {
            return Err(Error::channel(
                "telegram",
                format!("Rate limit exceeded. Status: {}", status),
            ));
        }
        500..=599 => {
            return Err(Error::channel(
                "telegram",
                format!("Telegram server error (transient). Status: {}", status),
            ));
        }
        _ => {}
    }

    let reply: ApiReply = serde_json::from_str(body).map_err(|e| {
        Error::channel(
            "telegram",
            format!("Unreadable reply (status {}): {}", status, e),
        )
    })?;

    if !reply.ok {
        tracing::warn!(
            "Telegram refused message (status {}): {}",
            status,
            reply.description.as_deref().unwrap_or("no description")
        );
    }
    Ok(reply.ok)
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn deliver(&self, destination: &str, credential: &str, message: &str) -> Result<bool> {
        if credential.is_empty() {
            return Err(Error::config("Telegram bot token is empty"));
        }
        if destination.is_empty() {
            return Err(Error::config("Telegram chat id is empty"));
        }

        let payload = SendMessage {
            chat_id: destination,
            text: message,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(self.send_message_url(credential))
            .json(&payload)
            .send()
            .await
            // The URL embeds the token
            .map_err(|e| Error::http(format!("Telegram request failed: {}", e.without_url())))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read Telegram reply: {}", e.without_url())))?;

        let delivered = interpret_reply(status, &body)?;
        if delivered {
            tracing::debug!("Telegram message delivered to chat {}", destination);
        }
        Ok(delivered)
    }

    fn channel_name(&self) -> &'static str {
        "telegram"
    }
}

/// Factory for creating Telegram channels
pub struct TelegramChannelFactory;

impl NotificationChannelFactory for TelegramChannelFactory {
    fn create(&self, config: &ChannelConfig) -> Result<Box<dyn NotificationChannel>> {
        if config.kind != "telegram" {
            return Err(Error::config(format!(
                "Invalid config for Telegram channel: type '{}'",
                config.kind
            )));
        }
        if config.enabled && config.credential.is_empty() {
            return Err(Error::config("Telegram channel is enabled but has no bot token"));
        }

        Ok(Box::new(TelegramChannel::new()))
    }
}

/// Register the Telegram channel with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_channel("telegram", Box::new(TelegramChannelFactory));
}
