//! # Blackout Records
//!
//! Advisory failure windows per (personality, user, channel). A subject in
//! blackout had a recent failure; callers use that to decide how loudly to
//! log or how long to cool down, never to drop a request. Uses DashMap for
//! concurrent access and prunes expired entries lazily on read and on
//! `prune()`.

use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::fingerprint::escape;
use crate::core::Clock;

/// Build the subject key for a (personality, user, channel) triple
pub fn subject_key(personality_id: &str, user_id: &str, channel_id: &str) -> String {
    format!(
        "{}:{}:{}",
        escape(personality_id),
        escape(user_id),
        escape(channel_id)
    )
}

#[derive(Clone)]
pub struct BlackoutRegistry {
    records: Arc<DashMap<String, Instant>>,
    clock: Arc<dyn Clock>,
}

impl BlackoutRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        BlackoutRegistry {
            records: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Record a failure, extending the window if one is already open
    pub fn record_failure(&self, subject: &str, duration: Duration) {
        let expiry = self.clock.now() + duration;
        let mut entry = self.records.entry(subject.to_string()).or_insert(expiry);
        if *entry < expiry {
            *entry = expiry;
        }
        debug!("Blackout recorded for {subject} ({duration:?})");
    }

    pub fn is_in_blackout(&self, subject: &str) -> bool {
        self.remaining(subject).is_some()
    }

    /// Time left in the subject's window, if any
    pub fn remaining(&self, subject: &str) -> Option<Duration> {
        let now = self.clock.now();
        let expiry = *self.records.get(subject)?;
        if expiry > now {
            Some(expiry - now)
        } else {
            self.records.remove_if(subject, |_, expiry| *expiry <= now);
            None
        }
    }

    /// Drop expired records, returning how many were removed
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
