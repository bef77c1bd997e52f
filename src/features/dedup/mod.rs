//! # Feature: Deduplication & Blackout
//!
//! Ensures at most one model call runs per logical request and keeps
//! advisory failure windows per (personality, user, channel). Blackouts
//! never block a call; they only inform logging and cool-down decisions.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial release with fingerprinting, in-flight coalescing,
//!   tiered blackouts and response classification

pub mod blackout;
pub mod classifier;
pub mod fingerprint;
pub mod inflight;

pub use blackout::{subject_key, BlackoutRegistry};
pub use classifier::{
    classify_model_error, classify_response, BlackoutPolicy, FailureTier, ResponseClass,
};
pub use fingerprint::{content_hash, RequestFingerprint};
pub use inflight::{InflightError, InflightRegistry};

use log::{debug, error};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Clock, ModelError, RequestContext};

/// Outcome of one model call
pub type ModelOutcome = Result<String, ModelError>;

/// Coalesces identical requests and tracks blackouts. `T` is the settled
/// result shared by every caller with the same fingerprint.
#[derive(Clone)]
pub struct DedupManager<T = ModelOutcome>
where
    T: Clone,
{
    inflight: InflightRegistry<RequestFingerprint, T>,
    blackouts: BlackoutRegistry,
}

impl<T> DedupManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inflight: InflightRegistry::new(),
            blackouts: BlackoutRegistry::new(clock),
        }
    }

    pub fn compute_fingerprint(
        &self,
        personality_id: &str,
        content: &str,
        context: &RequestContext,
    ) -> RequestFingerprint {
        RequestFingerprint::compute(personality_id, content, context)
    }

    /// Run `work` unless a call with the same fingerprint is in flight, in
    /// which case return that call's result.
    pub async fn submit<F, Fut>(
        &self,
        fingerprint: RequestFingerprint,
        work: F,
    ) -> Result<T, InflightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        if self.inflight.is_pending(&fingerprint) {
            debug!("Joining in-flight request {fingerprint}");
        }

        self.inflight.run(fingerprint.clone(), work).await.map_err(|e| {
            error!("In-flight request {fingerprint} lost: {e}");
            e
        })
    }

    pub fn record_failure(&self, subject: &str, duration: Duration) {
        self.blackouts.record_failure(subject, duration);
    }

    pub fn is_in_blackout(&self, subject: &str) -> bool {
        self.blackouts.is_in_blackout(subject)
    }

    pub fn blackouts(&self) -> &BlackoutRegistry {
        &self.blackouts
    }

    pub fn pending_count(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn manager() -> DedupManager {
        DedupManager::new(Arc::new(ManualClock::new()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submit_runs_work_once_for_concurrent_duplicates() {
        let dedup = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = RequestContext::new("u1", "c1").with_message_id("m1");
        let fp = dedup.compute_fingerprint("obi", "hello", &ctx);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedup = dedup.clone();
            let fp = fp.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                dedup
                    .submit(fp, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(80)).await;
                        Ok("General Kenobi".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(Ok("General Kenobi".to_string())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_blackout_does_not_block_submit() {
        let dedup = manager();
        let subject = subject_key("obi", "u1", "c1");
        dedup.record_failure(&subject, Duration::from_secs(300));
        assert!(dedup.is_in_blackout(&subject));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fp = dedup.compute_fingerprint("obi", "again", &RequestContext::new("u1", "c1"));
        let outcome = dedup
            .submit(fp, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("still answered".to_string())
            })
            .await;

        assert_eq!(outcome, Ok(Ok("still answered".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_shared_with_waiters() {
        let dedup = manager();
        let fp = dedup.compute_fingerprint("obi", "x", &RequestContext::new("u1", "c1"));

        let (a, b) = tokio::join!(
            dedup.submit(fp.clone(), || async {
                sleep(Duration::from_millis(30)).await;
                Err(ModelError::Api("connection timed out".into()))
            }),
            dedup.submit(fp.clone(), || async { Ok("never runs".to_string()) }),
        );

        assert_eq!(a, Ok(Err(ModelError::Api("connection timed out".into()))));
        assert_eq!(a, b);
    }
}
