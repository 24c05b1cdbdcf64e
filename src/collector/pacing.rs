use crate::model::Dest;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Enforces a minimum gap between request starts that share a `dest` value.
///
/// Each caller reserves the next free slot for its dest under the lock and
/// then sleeps outside it, so waiting workers never block other dests.
#[derive(Debug)]
pub struct DestPacer {
    min_delay: Duration,
    next_slot: Mutex<HashMap<Dest, Instant>>,
}

impl DestPacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the earliest allowed start time for `dest` at or after `now`.
    pub fn reserve_at(&self, dest: Dest, now: Instant) -> Instant {
        let mut slots = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match slots.get(&dest) {
            Some(&next) if next > now => next,
            _ => now,
        };
        slots.insert(dest, slot + self.min_delay);
        slot
    }

    pub async fn wait_turn(&self, dest: Dest) {
        if self.min_delay.is_zero() {
            return;
        }
        let slot = self.reserve_at(dest, Instant::now());
        sleep_until(slot).await;
    }
}
