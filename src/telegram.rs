// src/telegram.rs
// Minimal Telegram Bot API client: sendMessage for delivery/replies and
// getUpdates long polling for the command surface.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::notify::{ChatId, DeliveryError};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

/// Bot API response envelope; `ok: false` carries the error details.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_api_root("https://api.telegram.org", token)
    }

    /// Point the client at a different API root (tests, local bot-api server).
    pub fn with_api_root(root: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base: format!("{}/bot{}", root.trim_end_matches('/'), token),
        }
    }

    /// Deliver one HTML-formatted message. Classifies failures into the
    /// transient/permanent taxonomy; retrying is the caller's decision.
    pub async fn send_message(&self, chat_id: ChatId, html_text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": html_text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let rsp = self
            .client
            .post(format!("{}/sendMessage", self.base))
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient {
                reason: format!("sendMessage request failed: {e}"),
                retry_after_secs: None,
            })?;

        let status = rsp.status();
        if status.is_success() {
            return Ok(());
        }

        let envelope: ApiEnvelope<serde_json::Value> = rsp.json().await.unwrap_or(ApiEnvelope {
            ok: false,
            result: None,
            description: None,
            parameters: None,
        });
        let retry_after = envelope.parameters.unwrap_or_default().retry_after;
        let description = envelope
            .description
            .unwrap_or_else(|| "no description".to_string());
        Err(classify_failure(status, &description, retry_after))
    }

    /// Long-poll for inbound updates. `offset` is one past the last
    /// processed update id. Errors here are cycle-local; the command loop
    /// logs and retries.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let rsp = self
            .client
            .get(format!("{}/getUpdates", self.base))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .context("getUpdates request")?
            .error_for_status()
            .context("getUpdates non-2xx")?;

        let envelope: ApiEnvelope<Vec<Update>> =
            rsp.json().await.context("getUpdates body")?;
        if !envelope.ok {
            anyhow::bail!(
                "getUpdates returned ok=false: {}",
                envelope.description.unwrap_or_default()
            );
        }
        Ok(envelope.result.unwrap_or_default())
    }
}

/// 429 and 5xx are worth retrying; any other rejection (bad chat, bot
/// blocked, malformed message) will not get better on its own.
fn classify_failure(status: StatusCode, description: &str, retry_after: Option<u64>) -> DeliveryError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DeliveryError::Transient {
            reason: format!("sendMessage {status}: {description}"),
            retry_after_secs: retry_after,
        }
    } else {
        DeliveryError::Permanent {
            reason: format!("sendMessage {status}: {description}"),
        }
    }
}
