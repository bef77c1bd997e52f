//! Recently sent chunk hashes.
//!
//! Sliding window keyed by chunk hash. A hash can be claimed once per
//! window; a failed send releases its claim so a retry is not mistaken for
//! a duplicate.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::Clock;

#[derive(Clone)]
pub struct RecentSends {
    sent: Arc<DashMap<String, Instant>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RecentSends {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        RecentSends {
            sent: Arc::new(DashMap::new()),
            window,
            clock,
        }
    }

    /// Claim `hash` for sending. Returns false if it was claimed within the
    /// window.
    pub fn try_claim(&self, hash: &str) -> bool {
        let now = self.clock.now();
        match self.sent.entry(hash.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn release(&self, hash: &str) {
        self.sent.remove(hash);
    }

    /// Drop hashes older than the window
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let before = self.sent.len();
        self.sent.retain(|_, at| now.duration_since(*at) < self.window);
        before.saturating_sub(self.sent.len())
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}
