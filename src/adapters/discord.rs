//! Discord webhooks as sender identities.
//!
//! Provisioning and execution both go through the REST API with the bot
//! token. An existing webhook in the channel with our name and a token is
//! reused before a new one is created.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::core::{PlatformClient, PlatformError, SendAck, SendPayload, SenderIdentity};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Webhook usernames longer than this are rejected by Discord
const MAX_USERNAME_CHARS: usize = 80;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct WebhookRecord {
    id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    id: String,
}

pub struct DiscordWebhooks {
    client: reqwest::Client,
    bot_token: String,
    webhook_name: String,
    api_base: String,
}

impl DiscordWebhooks {
    pub fn new(bot_token: impl Into<String>, webhook_name: impl Into<String>) -> Self {
        Self::with_api_base(bot_token, webhook_name, DISCORD_API_BASE)
    }

    pub fn with_api_base(
        bot_token: impl Into<String>,
        webhook_name: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("PersonaRelay/1.0")
            .build()
            .unwrap_or_default();
        Self {
            client,
            bot_token: bot_token.into(),
            webhook_name: webhook_name.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn identity_from(&self, channel_id: &str, hook: WebhookRecord, token: String) -> SenderIdentity {
        SenderIdentity {
            channel_id: channel_id.to_string(),
            endpoint_url: format!("{}/webhooks/{}/{}", self.api_base, hook.id, token),
            external_id: hook.id,
            secret_token: token,
            created_at: Utc::now(),
        }
    }

    async fn find_existing(&self, channel_id: &str) -> Result<Option<SenderIdentity>, PlatformError> {
        let url = format!("{}/channels/{channel_id}/webhooks", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let hooks: Vec<WebhookRecord> = response.json().await.map_err(transport_error)?;

        Ok(hooks.into_iter().find_map(|hook| {
            if hook.name.as_deref() != Some(self.webhook_name.as_str()) {
                return None;
            }
            let token = hook.token.clone()?;
            Some(self.identity_from(channel_id, hook, token))
        }))
    }
}

#[async_trait]
impl PlatformClient for DiscordWebhooks {
    async fn create_identity(&self, channel_id: &str) -> Result<SenderIdentity, PlatformError> {
        if let Some(identity) = self.find_existing(channel_id).await? {
            debug!("Reusing webhook {} in channel {channel_id}", identity.external_id);
            return Ok(identity);
        }

        let url = format!("{}/channels/{channel_id}/webhooks", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&json!({ "name": self.webhook_name }))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let hook: WebhookRecord = response.json().await.map_err(transport_error)?;
        let token = hook.token.clone().ok_or_else(|| PlatformError::Http {
            status: 200,
            message: "created webhook has no token".to_string(),
        })?;

        info!("🪝 Created webhook {} in channel {channel_id}", hook.id);
        Ok(self.identity_from(channel_id, hook, token))
    }

    async fn send(
        &self,
        identity: &SenderIdentity,
        payload: &SendPayload,
    ) -> Result<SendAck, PlatformError> {
        let response = self
            .client
            .post(format!("{}?wait=true", identity.endpoint_url))
            .json(&execute_body(payload))
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let message_id = response
            .json::<MessageRecord>()
            .await
            .ok()
            .map(|m| m.id);

        Ok(SendAck { message_id })
    }
}

/// JSON body for executing a webhook
fn execute_body(payload: &SendPayload) -> serde_json::Value {
    let username: String = payload.username.chars().take(MAX_USERNAME_CHARS).collect();
    let mut body = json!({
        "content": payload.content,
        "username": username,
        "allowed_mentions": { "parse": [] },
    });
    if let Some(ref avatar) = payload.avatar_url {
        body["avatar_url"] = json!(avatar);
    }
    body
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after_header(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, retry_after, &body))
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> PlatformError {
    match status.as_u16() {
        code @ (401 | 403) => PlatformError::Unauthorized(code),
        404 => PlatformError::NotFound,
        429 => PlatformError::RateLimited {
            retry_after: retry_after.or_else(|| retry_after_body(body)),
        },
        code => PlatformError::Http {
            status: code,
            message: body.chars().take(200).collect(),
        },
    }
}

pub(crate) fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Discord also reports `retry_after` (seconds) in the 429 body
fn retry_after_body(body: &str) -> Option<Duration> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("retry_after")?
        .as_f64()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn transport_error(e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout(REQUEST_TIMEOUT)
    } else {
        PlatformError::Transport(e.to_string())
    }
}
