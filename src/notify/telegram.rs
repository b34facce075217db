//! Telegram Bot API notification channel.
//!
//! Sends alerts to a fixed channel via `sendMessage` with Markdown
//! formatting. Base URL: https://api.telegram.org (configurable so tests
//! can point at a local stub).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::Notifier;

/// Delivery timeout; a wedged notification must not stall the scan.
const SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram channel client.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for Telegram")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed {status}: {body}");
        }

        let parsed: SendMessageResponse = resp
            .json()
            .await
            .context("Failed to parse Telegram sendMessage response")?;

        if !parsed.ok {
            anyhow::bail!(
                "Telegram rejected message: {}",
                parsed.description.unwrap_or_else(|| "no description".to_string())
            );
        }

        debug!(chat_id = %self.chat_id, "Notification delivered");
        Ok(())
    }
}
