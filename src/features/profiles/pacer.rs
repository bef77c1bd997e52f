//! Minimum spacing between outbound profile calls.
//!
//! Callers queue on an async mutex and each waits until `min_spacing` has
//! passed since the previous call started, so bursts are serialized instead
//! of hitting the collaborator in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::core::Clock;

pub struct Pacer {
    clock: Arc<dyn Clock>,
    min_spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(clock: Arc<dyn Clock>, min_spacing: Duration) -> Self {
        Pacer {
            clock,
            min_spacing,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until this caller may make its call, then claim the slot
    pub async fn wait_turn(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let next_allowed = last + self.min_spacing;
            let now = self.clock.now();
            if next_allowed > now {
                self.clock.sleep(next_allowed - now).await;
            }
        }

        *last_call = Some(self.clock.now());
    }
}
