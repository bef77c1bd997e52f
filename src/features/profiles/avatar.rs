//! Avatar URL validation with a process-lifetime warm set.

use dashmap::DashSet;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::core::AvatarProbe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarValidationResult {
    pub valid: bool,
    /// The validated URL, or the fallback when validation failed
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct AvatarValidator {
    probe: Arc<dyn AvatarProbe>,
    warm: Arc<DashSet<String>>,
    fallback_url: Option<String>,
    timeout: Duration,
}

impl AvatarValidator {
    pub fn new(probe: Arc<dyn AvatarProbe>, fallback_url: Option<String>, timeout: Duration) -> Self {
        Self {
            probe,
            warm: Arc::new(DashSet::new()),
            fallback_url,
            timeout,
        }
    }

    pub async fn validate(&self, url: Option<&str>) -> AvatarValidationResult {
        let url = match url.map(str::trim) {
            Some(u) if !u.is_empty() => u,
            _ => return self.fallback(),
        };

        if !(url.starts_with("https://") || url.starts_with("http://")) {
            warn!("Avatar URL is not http(s), using fallback: {url}");
            return self.fallback();
        }

        if self.warm.contains(url) {
            return AvatarValidationResult {
                valid: true,
                url: Some(url.to_string()),
            };
        }

        match timeout(self.timeout, self.probe.probe(url)).await {
            Ok(true) => {
                debug!("Avatar URL validated: {url}");
                self.warm.insert(url.to_string());
                AvatarValidationResult {
                    valid: true,
                    url: Some(url.to_string()),
                }
            }
            Ok(false) => {
                warn!("Avatar URL failed validation, using fallback: {url}");
                self.fallback()
            }
            Err(_) => {
                warn!("Avatar validation timed out after {:?}, using fallback: {url}", self.timeout);
                self.fallback()
            }
        }
    }

    pub fn is_warm(&self, url: &str) -> bool {
        self.warm.contains(url)
    }

    fn fallback(&self) -> AvatarValidationResult {
        AvatarValidationResult {
            valid: false,
            url: self.fallback_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FALLBACK: &str = "https://cdn.example.test/default.png";

    struct FakeProbe {
        answer: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(answer: bool) -> Arc<Self> {
            Arc::new(Self { answer, delay: Duration::ZERO, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl AvatarProbe for FakeProbe {
        async fn probe(&self, _url: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.answer
        }
    }

    fn validator(probe: Arc<FakeProbe>) -> AvatarValidator {
        AvatarValidator::new(probe, Some(FALLBACK.to_string()), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_valid_url_memoized() {
        let probe = FakeProbe::new(true);
        let validator = validator(probe.clone());
        let url = "https://cdn.example.test/obi.png";

        let first = validator.validate(Some(url)).await;
        let second = validator.validate(Some(url)).await;

        assert!(first.valid);
        assert_eq!(first, second);
        assert_eq!(first.url.as_deref(), Some(url));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(validator.is_warm(url));
    }

    #[tokio::test]
    async fn test_invalid_url_falls_back_and_is_rechecked() {
        let probe = FakeProbe::new(false);
        let validator = validator(probe.clone());

        let result = validator.validate(Some("https://cdn.example.test/broken.png")).await;
        assert!(!result.valid);
        assert_eq!(result.url.as_deref(), Some(FALLBACK));

        validator.validate(Some("https://cdn.example.test/broken.png")).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_url_skips_probe() {
        let probe = FakeProbe::new(true);
        let validator = validator(probe.clone());

        assert_eq!(validator.validate(None).await.url.as_deref(), Some(FALLBACK));
        assert_eq!(validator.validate(Some("  ")).await.url.as_deref(), Some(FALLBACK));
        assert!(!validator.validate(Some("ftp://host/a.png")).await.valid);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out_to_fallback() {
        let probe = Arc::new(FakeProbe {
            answer: true,
            delay: Duration::from_millis(500),
            calls: AtomicUsize::new(0),
        });
        let validator = validator(probe);

        let result = validator.validate(Some("https://slow.example.test/a.png")).await;
        assert!(!result.valid);
        assert_eq!(result.url.as_deref(), Some(FALLBACK));
    }
}
