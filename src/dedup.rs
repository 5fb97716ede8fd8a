//! Time-windowed event deduplication.
//!
//! Slack redelivers an event when it does not get a timely acknowledgment,
//! so every webhook flow checks the event id here before doing any work.

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(300);

/// A set of recently seen event ids with lazy, sweep-on-lookup expiry.
///
/// Shared across concurrent webhook flows; the map guards each entry so two
/// deliveries arriving together cannot corrupt state.
pub struct EventDeduper {
    seen: DashMap<String, Instant>,
    ttl: Duration,
}

impl EventDeduper {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// Returns true when the event id was already processed inside the TTL
    /// window. A first-time id is marked as seen before returning false.
    ///
    /// An empty id is never a duplicate and is never inserted: Slack does
    /// not guarantee an event id, and id-less events must still be
    /// processed.
    pub fn check_and_mark(&self, event_id: &str) -> bool {
        self.check_and_mark_at(event_id, Instant::now())
    }

    /// Same as [`check_and_mark`](Self::check_and_mark) with an explicit
    /// clock reading, so TTL behavior is testable without sleeping.
    pub fn check_and_mark_at(&self, event_id: &str, now: Instant) -> bool {
        if event_id.is_empty() {
            return false;
        }

        let ttl = self.ttl;
        let mut expired = 0;
        self.seen.retain(|_, first_seen| {
            let keep = now.saturating_duration_since(*first_seen) <= ttl;
            if !keep {
                expired += 1;
            }
            keep
        });
        if expired > 0 {
            tracing::debug!(expired = expired, "Swept expired event ids");
        }

        if self.seen.contains_key(event_id) {
            return true;
        }
        self.seen.insert(event_id.to_string(), now);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for EventDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TTL)
    }
}
