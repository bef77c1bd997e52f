//! Narrow interfaces to the systems the pipeline talks to: the language
//! model, the chat platform's webhook API, and the external profile service.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::types::{Personality, ProfileData, RequestContext, SendAck, SendPayload, SenderIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    #[error("model API error: {0}")]
    Api(String),
    #[error("model returned no usable content")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("identity rejected by platform (HTTP {0})")]
    Unauthorized(u16),
    #[error("identity or channel not found")]
    NotFound,
    #[error("rate limited by platform (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("platform HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("platform request timed out after {0:?}")]
    Timeout(Duration),
    #[error("platform transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    /// The identity used for the call is no longer accepted and must be
    /// reprovisioned.
    pub fn is_identity_revoked(&self) -> bool {
        matches!(self, PlatformError::Unauthorized(_) | PlatformError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileFetchError {
    #[error("profile not found")]
    NotFound,
    #[error("profile service rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("profile service HTTP {0}")]
    Server(u16),
    #[error("profile transport error: {0}")]
    Transport(String),
}

/// Generates reply text for a personality.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        personality: &Personality,
        content: &str,
        context: &RequestContext,
    ) -> Result<String, ModelError>;
}

/// Provisions per-channel sender identities and posts through them.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_identity(&self, channel_id: &str) -> Result<SenderIdentity, PlatformError>;

    async fn send(
        &self,
        identity: &SenderIdentity,
        payload: &SendPayload,
    ) -> Result<SendAck, PlatformError>;
}

/// Looks up display data for an external subject.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, subject_id: &str) -> Result<ProfileData, ProfileFetchError>;
}

/// Checks whether a URL serves a usable image.
#[async_trait]
pub trait AvatarProbe: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_revoked_classification() {
        assert!(PlatformError::Unauthorized(401).is_identity_revoked());
        assert!(PlatformError::NotFound.is_identity_revoked());
        assert!(!PlatformError::RateLimited { retry_after: None }.is_identity_revoked());
        assert!(!PlatformError::Transport("reset".into()).is_identity_revoked());
    }
}
