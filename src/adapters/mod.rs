//! # Adapters
//!
//! Concrete collaborators for production: OpenAI for replies, Discord
//! webhooks for delivery, and an HTTP profile service.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

pub mod discord;
pub mod model;
pub mod profiles;

pub use discord::DiscordWebhooks;
pub use model::OpenAiModel;
pub use profiles::{HttpProfileFetcher, ReqwestAvatarProbe};
