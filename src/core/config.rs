//! Process configuration from the environment plus the tunable pipeline
//! policy document (YAML).
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default platform message length limit (characters)
pub const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub log_level: String,
    pub personalities_path: String,
    pub pipeline_config_path: Option<String>,
    pub profile_api_base_url: Option<String>,
    pub command_prefix: String,
    pub webhook_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let discord_token =
            env::var("DISCORD_TOKEN").context("DISCORD_TOKEN environment variable not set")?;
        let openai_api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable not set")?;

        Ok(Config {
            discord_token,
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            personalities_path: env::var("PERSONALITIES_PATH")
                .unwrap_or_else(|_| "personalities.yaml".to_string()),
            pipeline_config_path: env::var("PIPELINE_CONFIG_PATH").ok(),
            profile_api_base_url: env::var("PROFILE_API_BASE_URL").ok(),
            command_prefix: env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),
            webhook_name: env::var("WEBHOOK_NAME").unwrap_or_else(|_| "Persona Relay".to_string()),
        })
    }
}

/// Tunable policy for the whole pipeline. Every section has defaults, so an
/// empty document is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub delivery: DeliverySettings,
    pub blackout: BlackoutSettings,
    pub profiles: ProfileSettings,
    pub model: ModelSettings,
    pub identity: IdentitySettings,
    pub messages: MessageSettings,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {path}"))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(contents).context("Invalid pipeline config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.delivery.message_limit == 0 {
            return Err(anyhow::anyhow!("delivery.message_limit must be at least 1"));
        }
        let decoration_len = self.delivery.prefix_marker.as_deref().map_or(0, |m| m.chars().count())
            + self.delivery.suffix_marker.as_deref().map_or(0, |m| m.chars().count());
        if decoration_len >= self.delivery.message_limit {
            return Err(anyhow::anyhow!(
                "Decoration markers ({decoration_len} chars) leave no room under the message limit"
            ));
        }
        if self.profiles.max_attempts == 0 {
            return Err(anyhow::anyhow!("profiles.max_attempts must be at least 1"));
        }
        if self.profiles.base_backoff_ms > self.profiles.max_backoff_ms {
            return Err(anyhow::anyhow!(
                "profiles.base_backoff_ms ({}) exceeds profiles.max_backoff_ms ({})",
                self.profiles.base_backoff_ms,
                self.profiles.max_backoff_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub message_limit: usize,
    pub chunk_delay_ms: u64,
    pub duplicate_window_ms: u64,
    pub send_timeout_ms: u64,
    pub default_avatar_url: Option<String>,
    pub avatar_timeout_ms: u64,
    /// Marker prepended to every reply before segmentation
    pub prefix_marker: Option<String>,
    /// Marker appended to every reply before segmentation
    pub suffix_marker: Option<String>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            message_limit: MESSAGE_LIMIT,
            chunk_delay_ms: 750,
            duplicate_window_ms: 10_000,
            send_timeout_ms: 15_000,
            default_avatar_url: None,
            avatar_timeout_ms: 3_000,
            prefix_marker: None,
            suffix_marker: None,
        }
    }
}

impl DeliverySettings {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn avatar_timeout(&self) -> Duration {
        Duration::from_millis(self.avatar_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackoutSettings {
    /// Empty or malformed model output
    pub soft_ms: u64,
    /// Stack-trace-like output or a failed model call
    pub hard_ms: u64,
    pub prune_interval_secs: u64,
}

impl Default for BlackoutSettings {
    fn default() -> Self {
        Self {
            soft_ms: 30_000,
            hard_ms: 300_000,
            prune_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    pub ttl_secs: u64,
    /// Outbound calls allowed per lookup, including the first
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive rate-limit responses (any subject) before the global cooldown
    pub cooldown_after: u32,
    pub cooldown_secs: u64,
    pub min_spacing_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_attempts: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            cooldown_after: 10,
            cooldown_secs: 60,
            min_spacing_ms: 250,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl ProfileSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { timeout_secs: 45 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Reprovision identities older than this. Unset means identities live
    /// until invalidated.
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    pub soft_error: String,
    pub hard_error: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            soft_error: "I couldn't come up with a reply just now. Please try again in a moment."
                .to_string(),
            hard_error: "Something went wrong on my end while answering.".to_string(),
        }
    }
}
