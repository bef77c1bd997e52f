//! Profile info cache
//!
//! TTL cache in front of the external profile service. Rate-limit responses
//! are retried with exponential backoff; enough consecutive rate limits
//! (across all subjects) trip a global cooldown during which lookups
//! short-circuit instead of calling out. Stale entries are refetched on
//! access and served when a refetch is unavailable.

use dashmap::DashMap;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use super::pacer::Pacer;
use crate::core::config::ProfileSettings;
use crate::core::{Clock, ProfileData, ProfileFetchError, ProfileFetcher};
use crate::features::dedup::InflightRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCacheEntry {
    pub subject_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub fetched_at: Instant,
}

impl ProfileCacheEntry {
    fn to_profile(&self) -> ProfileData {
        ProfileData {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    Found(ProfileData),
    NotFound,
    /// The service could not be reached, is rate limiting us, or we are
    /// cooling down
    Unavailable,
}

impl ProfileLookup {
    pub fn profile(&self) -> Option<&ProfileData> {
        match self {
            ProfileLookup::Found(profile) => Some(profile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchOutcome {
    Fetched(ProfileData),
    NotFound,
    Unavailable,
}

struct Inner {
    fetcher: Arc<dyn ProfileFetcher>,
    clock: Arc<dyn Clock>,
    settings: ProfileSettings,
    entries: DashMap<String, ProfileCacheEntry>,
    pacer: Pacer,
    cooldown_until: Mutex<Option<Instant>>,
    consecutive_rate_limits: AtomicU32,
}

#[derive(Clone)]
pub struct ProfileInfoCache {
    inner: Arc<Inner>,
    inflight: InflightRegistry<String, FetchOutcome>,
}

impl ProfileInfoCache {
    pub fn new(
        fetcher: Arc<dyn ProfileFetcher>,
        clock: Arc<dyn Clock>,
        settings: ProfileSettings,
    ) -> Self {
        let pacer = Pacer::new(Arc::clone(&clock), settings.min_spacing());
        Self {
            inner: Arc::new(Inner {
                fetcher,
                clock,
                settings,
                entries: DashMap::new(),
                pacer,
                cooldown_until: Mutex::new(None),
                consecutive_rate_limits: AtomicU32::new(0),
            }),
            inflight: InflightRegistry::new(),
        }
    }

    pub async fn get(&self, subject_id: &str) -> ProfileLookup {
        let now = self.inner.clock.now();
        let cached = self.inner.entries.get(subject_id).map(|e| e.value().clone());

        if let Some(entry) = &cached {
            if now.duration_since(entry.fetched_at) < self.inner.settings.ttl() {
                return ProfileLookup::Found(entry.to_profile());
            }
            debug!("Profile for {subject_id} is stale, refetching");
        }

        let stale_or_unavailable = |cached: Option<ProfileCacheEntry>| {
            cached
                .map(|entry| ProfileLookup::Found(entry.to_profile()))
                .unwrap_or(ProfileLookup::Unavailable)
        };

        if self.inner.in_cooldown() {
            debug!("Profile lookups cooling down, skipping fetch for {subject_id}");
            return stale_or_unavailable(cached);
        }

        let inner = Arc::clone(&self.inner);
        let subject = subject_id.to_string();
        let outcome = self
            .inflight
            .run(subject_id.to_string(), move || async move {
                inner.fetch_with_retry(&subject).await
            })
            .await
            .unwrap_or(FetchOutcome::Unavailable);

        match outcome {
            FetchOutcome::Fetched(profile) => ProfileLookup::Found(profile),
            FetchOutcome::NotFound => ProfileLookup::NotFound,
            FetchOutcome::Unavailable => stale_or_unavailable(cached),
        }
    }

    /// Whether lookups are currently short-circuited
    pub fn in_cooldown(&self) -> bool {
        self.inner.in_cooldown()
    }

    pub fn invalidate(&self, subject_id: &str) {
        self.inner.entries.remove(subject_id);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl Inner {
    fn in_cooldown(&self) -> bool {
        let mut cooldown = self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner());
        match *cooldown {
            Some(until) if until > self.clock.now() => true,
            Some(_) => {
                *cooldown = None;
                false
            }
            None => false,
        }
    }

    fn enter_cooldown(&self) {
        let until = self.clock.now() + self.settings.cooldown();
        *self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner()) = Some(until);
        self.consecutive_rate_limits.store(0, Ordering::SeqCst);
        warn!(
            "⏸️ Profile service rate limited repeatedly, pausing lookups for {:?}",
            self.settings.cooldown()
        );
    }

    async fn fetch_with_retry(&self, subject_id: &str) -> FetchOutcome {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 0..max_attempts {
            if attempt > 0 && self.in_cooldown() {
                return FetchOutcome::Unavailable;
            }

            self.pacer.wait_turn().await;
            let result = match timeout(
                self.settings.fetch_timeout(),
                self.fetcher.fetch_profile(subject_id),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProfileFetchError::Transport(format!(
                    "timed out after {:?}",
                    self.settings.fetch_timeout()
                ))),
            };

            let retry_hint = match result {
                Ok(profile) => {
                    self.consecutive_rate_limits.store(0, Ordering::SeqCst);
                    self.store(subject_id, &profile);
                    return FetchOutcome::Fetched(profile);
                }
                Err(ProfileFetchError::NotFound) => {
                    self.consecutive_rate_limits.store(0, Ordering::SeqCst);
                    self.entries.remove(subject_id);
                    info!("No profile found for {subject_id}");
                    return FetchOutcome::NotFound;
                }
                Err(ProfileFetchError::RateLimited { retry_after }) => {
                    let streak = self.consecutive_rate_limits.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(
                        "Profile fetch for {subject_id} rate limited (attempt {}/{max_attempts}, streak {streak})",
                        attempt + 1
                    );
                    if streak >= self.settings.cooldown_after {
                        self.enter_cooldown();
                        return FetchOutcome::Unavailable;
                    }
                    retry_after
                }
                Err(e) => {
                    warn!(
                        "Profile fetch for {subject_id} failed (attempt {}/{max_attempts}): {e}",
                        attempt + 1
                    );
                    None
                }
            };

            if attempt + 1 < max_attempts {
                self.clock.sleep(self.backoff(attempt, retry_hint)).await;
            }
        }

        warn!("Giving up on profile for {subject_id} after {max_attempts} attempts");
        FetchOutcome::Unavailable
    }

    /// Exponential backoff, at least the server's hint, capped, plus up to
    /// 10% jitter
    fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let base = Duration::from_millis(self.settings.base_backoff_ms);
        let cap = Duration::from_millis(self.settings.max_backoff_ms);
        let exponential = base.saturating_mul(2u32.saturating_pow(attempt)).min(cap);
        let delay = hint.map_or(exponential, |h| h.max(exponential)).min(cap);

        let jitter_ms = delay.as_millis() as u64 / 10;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        delay + jitter
    }

    fn store(&self, subject_id: &str, profile: &ProfileData) {
        self.entries.insert(
            subject_id.to_string(),
            ProfileCacheEntry {
                subject_id: subject_id.to_string(),
                display_name: profile.display_name.clone(),
                avatar_url: profile.avatar_url.clone(),
                fetched_at: self.clock.now(),
            },
        );
    }
}
