//! Sender identity cache
//!
//! One webhook-style identity per channel. Concurrent first lookups for a
//! channel share a single provisioning call.

use chrono::Utc;
use dashmap::DashMap;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{PlatformClient, PlatformError, SenderIdentity};
use crate::features::dedup::InflightRegistry;

type ProvisionOutcome = Result<SenderIdentity, PlatformError>;

#[derive(Clone)]
pub struct SenderIdentityCache {
    platform: Arc<dyn PlatformClient>,
    identities: Arc<DashMap<String, SenderIdentity>>,
    provisioning: InflightRegistry<String, ProvisionOutcome>,
    max_age: Option<Duration>,
}

impl SenderIdentityCache {
    pub fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            platform,
            identities: Arc::new(DashMap::new()),
            provisioning: InflightRegistry::new(),
            max_age: None,
        }
    }

    /// Reprovision identities older than `max_age`
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Return the channel's identity, provisioning one on a miss
    pub async fn get_or_create(&self, channel_id: &str) -> Result<SenderIdentity, PlatformError> {
        if let Some(identity) = self.cached(channel_id) {
            return Ok(identity);
        }

        let platform = Arc::clone(&self.platform);
        let identities = Arc::clone(&self.identities);
        let channel = channel_id.to_string();

        let outcome = self
            .provisioning
            .run(channel_id.to_string(), move || async move {
                info!("Provisioning sender identity for channel {channel}");
                let identity = platform.create_identity(&channel).await?;
                // Cached before the in-flight entry is released
                identities.insert(channel, identity.clone());
                Ok::<SenderIdentity, PlatformError>(identity)
            })
            .await;

        match outcome {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!("Failed to provision sender identity for channel {channel_id}: {e}");
                }
                result
            }
            Err(e) => Err(PlatformError::Transport(e.to_string())),
        }
    }

    /// Forget a channel's identity so the next lookup reprovisions
    pub fn invalidate(&self, channel_id: &str) -> bool {
        let removed = self.identities.remove(channel_id).is_some();
        if removed {
            info!("Invalidated sender identity for channel {channel_id}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    fn cached(&self, channel_id: &str) -> Option<SenderIdentity> {
        let identity = self.identities.get(channel_id)?.value().clone();

        if let Some(max_age) = self.max_age {
            let age = Utc::now()
                .signed_duration_since(identity.created_at)
                .to_std()
                .unwrap_or_default();
            if age >= max_age {
                info!("Sender identity for channel {channel_id} expired after {age:?}");
                self.identities.remove(channel_id);
                return None;
            }
        }
        Some(identity)
    }
}
