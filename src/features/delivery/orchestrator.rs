//! # Delivery Orchestrator
//!
//! Posts a generated reply to a channel as the personality: resolves the
//! sender name and avatar, segments the reply, obtains the channel's sender
//! identity, then sends chunks strictly in order with a fixed pause between
//! them. Chunks already sent within the duplicate window are skipped and
//! logged. A failed send stops the sequence and is reported as a partial
//! delivery; nothing is retried here.

use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

use super::recent::RecentSends;
use crate::core::config::DeliverySettings;
use crate::core::{Clock, Personality, PlatformClient, PlatformError, SendPayload};
use crate::features::dedup::content_hash;
use crate::features::identity::SenderIdentityCache;
use crate::features::profiles::{AvatarValidator, ProfileInfoCache, ProfileLookup};
use crate::features::segmentation::{segment, Decorations, MessageChunk};

#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    /// Overrides the configured status markers for this delivery
    pub decorations: Option<Decorations>,
    /// Correlation id for log lines
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub channel_id: String,
    pub total_chunks: usize,
    pub delivered: usize,
    /// Chunks skipped because they were sent moments ago
    pub suppressed: usize,
    /// Whitespace-only chunks, which the platform would reject
    pub skipped_blank: usize,
    /// Set when a send failed; chunks after it were not attempted
    pub failure: Option<PlatformError>,
}

impl DeliveryResult {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("could not obtain a sender identity: {0}")]
    Identity(PlatformError),
}

#[derive(Clone)]
pub struct DeliveryOrchestrator {
    platform: Arc<dyn PlatformClient>,
    identities: SenderIdentityCache,
    profiles: Option<ProfileInfoCache>,
    avatars: AvatarValidator,
    recent: RecentSends,
    clock: Arc<dyn Clock>,
    settings: DeliverySettings,
}

impl DeliveryOrchestrator {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        identities: SenderIdentityCache,
        avatars: AvatarValidator,
        clock: Arc<dyn Clock>,
        settings: DeliverySettings,
    ) -> Self {
        let recent = RecentSends::new(settings.duplicate_window(), Arc::clone(&clock));
        Self {
            platform,
            identities,
            profiles: None,
            avatars,
            recent,
            clock,
            settings,
        }
    }

    pub fn with_profiles(mut self, profiles: ProfileInfoCache) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn recent_sends(&self) -> &RecentSends {
        &self.recent
    }

    pub async fn deliver(
        &self,
        channel_id: &str,
        personality: &Personality,
        reply_text: &str,
        options: &DeliveryOptions,
    ) -> Result<DeliveryResult, DeliveryError> {
        let request_id = options.request_id.unwrap_or_else(Uuid::new_v4);
        let (username, avatar_url) = self.resolve_sender(personality).await;

        let decorations = options.decorations.clone().unwrap_or_else(|| {
            Decorations::new(
                self.settings.prefix_marker.clone(),
                self.settings.suffix_marker.clone(),
            )
        });
        let chunks = segment(reply_text, self.settings.message_limit, Some(&decorations));
        debug!(
            "[{request_id}] Segmented {} chars into {} chunk(s) for channel {channel_id}",
            reply_text.chars().count(),
            chunks.len()
        );

        let identity = self
            .identities
            .get_or_create(channel_id)
            .await
            .map_err(|e| {
                error!("[{request_id}] No sender identity for channel {channel_id}: {e}");
                DeliveryError::Identity(e)
            })?;

        let mut result = DeliveryResult {
            channel_id: channel_id.to_string(),
            total_chunks: chunks.len(),
            delivered: 0,
            suppressed: 0,
            skipped_blank: 0,
            failure: None,
        };

        for chunk in &chunks {
            if chunk.text.trim().is_empty() {
                debug!("[{request_id}] Skipping blank chunk {}", chunk.index);
                result.skipped_blank += 1;
                continue;
            }

            let hash = self.chunk_hash(channel_id, personality, chunk);
            if !self.recent.try_claim(&hash) {
                warn!(
                    "[{request_id}] Suppressed duplicate chunk {}/{} for {} in channel {channel_id}",
                    chunk.index + 1,
                    chunks.len(),
                    personality.id
                );
                result.suppressed += 1;
                continue;
            }

            if result.delivered > 0 {
                self.clock.sleep(self.settings.chunk_delay()).await;
            }

            let payload = SendPayload {
                content: chunk.text.clone(),
                username: username.clone(),
                avatar_url: avatar_url.clone(),
            };

            let outcome = match timeout(
                self.settings.send_timeout(),
                self.platform.send(&identity, &payload),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(PlatformError::Timeout(self.settings.send_timeout())),
            };

            match outcome {
                Ok(_) => result.delivered += 1,
                Err(e) => {
                    // A timed-out send may still have been posted, so its claim stays
                    if !matches!(e, PlatformError::Timeout(_)) {
                        self.recent.release(&hash);
                    }
                    error!(
                        "[{request_id}] Send failed on chunk {}/{} in channel {channel_id}: {e}",
                        chunk.index + 1,
                        chunks.len()
                    );
                    if e.is_identity_revoked() {
                        self.identities.invalidate(channel_id);
                    }
                    result.failure = Some(e);
                    break;
                }
            }
        }

        if result.is_complete() {
            info!(
                "[{request_id}] 📨 Delivered {}/{} chunk(s) as {} to channel {channel_id} (suppressed {})",
                result.delivered, result.total_chunks, username, result.suppressed
            );
        } else {
            warn!(
                "[{request_id}] Partial delivery to channel {channel_id}: {}/{} chunk(s) sent",
                result.delivered, result.total_chunks
            );
        }

        Ok(result)
    }

    /// Sender name and validated avatar for a personality
    async fn resolve_sender(&self, personality: &Personality) -> (String, Option<String>) {
        let mut name = personality.display_name.clone();
        let mut avatar = personality.avatar_url.clone();

        if let (Some(subject), Some(profiles)) = (&personality.profile_subject, &self.profiles) {
            match profiles.get(subject).await {
                ProfileLookup::Found(profile) => {
                    if !profile.display_name.trim().is_empty() {
                        name = profile.display_name;
                    }
                    avatar = profile.avatar_url.or(avatar);
                }
                ProfileLookup::NotFound => {
                    debug!("No external profile for {subject}, using personality defaults");
                }
                ProfileLookup::Unavailable => {
                    debug!("Profile for {subject} unavailable, using personality defaults");
                }
            }
        }

        let validated = self.avatars.validate(avatar.as_deref()).await;
        (name, validated.url)
    }

    fn chunk_hash(&self, channel_id: &str, personality: &Personality, chunk: &MessageChunk) -> String {
        content_hash(&format!(
            "{channel_id}\u{1f}{}\u{1f}{}\u{1f}{}",
            personality.id, chunk.index, chunk.text
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        AvatarProbe, ManualClock, ProfileData, ProfileFetchError, ProfileFetcher, SendAck,
        SenderIdentity,
    };
    use crate::core::config::ProfileSettings;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const DEFAULT_AVATAR: &str = "https://cdn.example.test/default.png";

    #[derive(Default)]
    struct FakePlatform {
        creates: AtomicUsize,
        sends: Mutex<Vec<(String, SendPayload)>>,
        /// Fail the send with this zero-based index across the platform's lifetime
        fail_at: Option<(usize, PlatformError)>,
        fail_create: bool,
        attempts: AtomicUsize,
        /// Real time each send takes before answering
        delay: Duration,
    }

    impl FakePlatform {
        fn sent(&self) -> Vec<SendPayload> {
            self.sends.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
        }

        fn sent_via(&self) -> Vec<String> {
            self.sends.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl PlatformClient for FakePlatform {
        async fn create_identity(&self, channel_id: &str) -> Result<SenderIdentity, PlatformError> {
            if self.fail_create {
                return Err(PlatformError::Http { status: 403, message: "Missing Permissions".into() });
            }
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(SenderIdentity {
                channel_id: channel_id.to_string(),
                external_id: format!("hook-{n}"),
                secret_token: "secret".into(),
                endpoint_url: format!("https://example.test/webhooks/hook-{n}/secret"),
                created_at: Utc::now(),
            })
        }

        async fn send(&self, identity: &SenderIdentity, payload: &SendPayload) -> Result<SendAck, PlatformError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some((at, err)) = &self.fail_at {
                if *at == attempt {
                    return Err(err.clone());
                }
            }
            self.sends
                .lock()
                .unwrap()
                .push((identity.external_id.clone(), payload.clone()));
            Ok(SendAck { message_id: Some(attempt.to_string()) })
        }
    }

    struct FixedProbe(bool);

    #[async_trait]
    impl AvatarProbe for FixedProbe {
        async fn probe(&self, _url: &str) -> bool {
            self.0
        }
    }

    struct FixedProfile(ProfileData);

    #[async_trait]
    impl ProfileFetcher for FixedProfile {
        async fn fetch_profile(&self, _subject_id: &str) -> Result<ProfileData, ProfileFetchError> {
            Ok(self.0.clone())
        }
    }

    fn personality() -> Personality {
        Personality {
            id: "obi".into(),
            display_name: "Obi-Wan".into(),
            system_prompt: "You are Obi-Wan Kenobi.".into(),
            avatar_url: Some("https://cdn.example.test/obi.png".into()),
            error_message: None,
            profile_subject: None,
        }
    }

    fn settings() -> DeliverySettings {
        DeliverySettings {
            message_limit: 50,
            chunk_delay_ms: 750,
            duplicate_window_ms: 10_000,
            default_avatar_url: Some(DEFAULT_AVATAR.into()),
            ..DeliverySettings::default()
        }
    }

    fn orchestrator(
        platform: Arc<FakePlatform>,
        clock: Arc<ManualClock>,
        avatar_ok: bool,
        settings: DeliverySettings,
    ) -> DeliveryOrchestrator {
        let identities = SenderIdentityCache::new(platform.clone());
        let avatars = AvatarValidator::new(
            Arc::new(FixedProbe(avatar_ok)),
            settings.default_avatar_url.clone(),
            Duration::from_secs(1),
        );
        DeliveryOrchestrator::new(platform, identities, avatars, clock, settings)
    }

    fn long_reply() -> String {
        "The Force is what gives a Jedi his power. ".repeat(4)
    }

    #[tokio::test]
    async fn test_chunks_sent_in_order_with_pacing() {
        let platform = Arc::new(FakePlatform::default());
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock.clone(), true, settings());

        let reply = long_reply();
        let result = delivery
            .deliver("chan-1", &personality(), &reply, &DeliveryOptions::default())
            .await
            .unwrap();

        let sent = platform.sent();
        assert_eq!(result.total_chunks, 4);
        assert_eq!(result.delivered, 4);
        assert!(result.is_complete());
        assert_eq!(sent.iter().map(|p| p.content.as_str()).collect::<String>(), reply);
        assert!(sent.iter().all(|p| p.username == "Obi-Wan"));
        assert!(sent.iter().all(|p| p.content.chars().count() <= 50));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(750); 3]);
    }

    #[tokio::test]
    async fn test_identical_delivery_within_window_suppressed() {
        let platform = Arc::new(FakePlatform::default());
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock.clone(), true, settings());
        let reply = long_reply();

        let first = delivery
            .deliver("chan-1", &personality(), &reply, &DeliveryOptions::default())
            .await
            .unwrap();
        let second = delivery
            .deliver("chan-1", &personality(), &reply, &DeliveryOptions::default())
            .await
            .unwrap();

        assert_eq!(first.delivered, 4);
        assert_eq!(second.delivered, 0);
        assert_eq!(second.suppressed, 4);
        assert_eq!(platform.sent().len(), 4);

        // Another channel is not a duplicate
        let other = delivery
            .deliver("chan-2", &personality(), &reply, &DeliveryOptions::default())
            .await
            .unwrap();
        assert_eq!(other.delivered, 4);

        clock.advance(Duration::from_secs(11));
        let later = delivery
            .deliver("chan-1", &personality(), &reply, &DeliveryOptions::default())
            .await
            .unwrap();
        assert_eq!(later.delivered, 4);
    }

    #[tokio::test]
    async fn test_failure_mid_sequence_reports_partial() {
        let platform = Arc::new(FakePlatform {
            fail_at: Some((2, PlatformError::Http { status: 500, message: "oops".into() })),
            ..FakePlatform::default()
        });
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock, true, settings());

        let result = delivery
            .deliver("chan-1", &personality(), &long_reply(), &DeliveryOptions::default())
            .await
            .unwrap();

        assert_eq!(result.delivered, 2);
        assert_eq!(result.total_chunks, 4);
        assert!(matches!(result.failure, Some(PlatformError::Http { status: 500, .. })));
        assert_eq!(platform.attempts.load(Ordering::SeqCst), 3);
        // The failed chunk was not marked as sent
        assert_eq!(delivery.recent_sends().len(), 2);
    }

    #[tokio::test]
    async fn test_slow_send_times_out_and_keeps_claim() {
        let platform = Arc::new(FakePlatform {
            delay: Duration::from_millis(200),
            ..FakePlatform::default()
        });
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(
            platform.clone(),
            clock,
            true,
            DeliverySettings {
                send_timeout_ms: 20,
                ..settings()
            },
        );

        let timed_out = delivery
            .deliver("chan-1", &personality(), "hello", &DeliveryOptions::default())
            .await
            .unwrap();
        assert_eq!(timed_out.delivered, 0);
        assert_eq!(
            timed_out.failure,
            Some(PlatformError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(delivery.recent_sends().len(), 1);

        // The post may have landed, so a retry inside the window is not resent
        let retried = delivery
            .deliver("chan-1", &personality(), "hello", &DeliveryOptions::default())
            .await
            .unwrap();
        assert_eq!(retried.suppressed, 1);
        assert_eq!(platform.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revoked_identity_invalidated() {
        let platform = Arc::new(FakePlatform {
            fail_at: Some((0, PlatformError::NotFound)),
            ..FakePlatform::default()
        });
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock, true, settings());

        let failed = delivery
            .deliver("chan-1", &personality(), "hello", &DeliveryOptions::default())
            .await
            .unwrap();
        assert_eq!(failed.delivered, 0);
        assert_eq!(failed.failure, Some(PlatformError::NotFound));

        let retried = delivery
            .deliver("chan-1", &personality(), "hello", &DeliveryOptions::default())
            .await
            .unwrap();
        assert_eq!(retried.delivered, 1);
        assert_eq!(platform.creates.load(Ordering::SeqCst), 2);
        assert_eq!(platform.sent_via(), vec!["hook-1".to_string()]);
    }

    #[tokio::test]
    async fn test_identity_failure_sends_nothing() {
        let platform = Arc::new(FakePlatform { fail_create: true, ..FakePlatform::default() });
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock, true, settings());

        let result = delivery
            .deliver("chan-1", &personality(), "hello", &DeliveryOptions::default())
            .await;

        assert!(matches!(result, Err(DeliveryError::Identity(_))));
        assert_eq!(platform.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_avatar_uses_default() {
        let platform = Arc::new(FakePlatform::default());
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock, false, settings());

        delivery
            .deliver("chan-1", &personality(), "hello", &DeliveryOptions::default())
            .await
            .unwrap();

        assert_eq!(platform.sent()[0].avatar_url.as_deref(), Some(DEFAULT_AVATAR));
    }

    #[tokio::test]
    async fn test_profile_subject_overrides_sender() {
        let platform = Arc::new(FakePlatform::default());
        let clock = Arc::new(ManualClock::new());
        let profiles = ProfileInfoCache::new(
            Arc::new(FixedProfile(ProfileData {
                display_name: "Ben Kenobi".into(),
                avatar_url: Some("https://cdn.example.test/ben.png".into()),
            })),
            clock.clone(),
            ProfileSettings::default(),
        );
        let delivery = orchestrator(platform.clone(), clock, true, settings()).with_profiles(profiles);

        let mut obi = personality();
        obi.profile_subject = Some("ben".into());
        delivery
            .deliver("chan-1", &obi, "hello", &DeliveryOptions::default())
            .await
            .unwrap();

        let sent = platform.sent();
        assert_eq!(sent[0].username, "Ben Kenobi");
        assert_eq!(sent[0].avatar_url.as_deref(), Some("https://cdn.example.test/ben.png"));
    }

    #[tokio::test]
    async fn test_status_markers_applied_before_segmenting() {
        let platform = Arc::new(FakePlatform::default());
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(
            platform.clone(),
            clock,
            true,
            DeliverySettings { suffix_marker: Some(" ✦".into()), ..settings() },
        );

        let reply = "x".repeat(49);
        let result = delivery
            .deliver("chan-1", &personality(), &reply, &DeliveryOptions::default())
            .await
            .unwrap();

        assert_eq!(result.total_chunks, 2);
        let sent = platform.sent();
        assert!(sent.iter().all(|p| p.content.chars().count() <= 50));
        let joined: String = sent.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(joined, format!("{reply} ✦"));
        assert_eq!(sent[1].content, "✦");
    }

    #[tokio::test]
    async fn test_blank_reply_sends_nothing() {
        let platform = Arc::new(FakePlatform::default());
        let clock = Arc::new(ManualClock::new());
        let delivery = orchestrator(platform.clone(), clock, true, settings());

        let result = delivery
            .deliver("chan-1", &personality(), "   ", &DeliveryOptions::default())
            .await
            .unwrap();

        assert_eq!(result.skipped_blank, 1);
        assert_eq!(result.delivered, 0);
        assert!(platform.sent().is_empty());
    }
}
