//! Shared domain records passed between pipeline components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A personality profile the bot can speak as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    /// Short identifier used in commands and keys (lowercase)
    pub id: String,
    /// Name shown as the webhook sender
    pub display_name: String,
    /// System prompt sent to the model
    pub system_prompt: String,
    /// Avatar shown next to the sender name
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Replaces the default user-facing error text. `{reference}` marks where
    /// the reference token goes; otherwise it is appended.
    #[serde(default)]
    pub error_message: Option<String>,
    /// External profile to pull the display name and avatar from
    #[serde(default)]
    pub profile_subject: Option<String>,
}

/// Who asked, where, and what they were replying to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub channel_id: String,
    pub message_id: Option<String>,
    /// Content of the message being replied to, if any
    pub reference_content: Option<String>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            message_id: None,
            reference_content: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_reference(mut self, content: impl Into<String>) -> Self {
        self.reference_content = Some(content.into());
        self
    }
}

/// Platform-provisioned handle for posting under a custom name in one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub channel_id: String,
    pub external_id: String,
    pub secret_token: String,
    pub endpoint_url: String,
    pub created_at: DateTime<Utc>,
}

/// Display data for a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Everything the platform needs to post one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPayload {
    pub content: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Platform acknowledgement of a delivered chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendAck {
    pub message_id: Option<String>,
}
