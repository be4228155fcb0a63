use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);
pub const DEFAULT_CAPACITY: usize = 100;

/// Recently seen event ids.
///
/// Entries expire after `ttl`; past `capacity` the oldest go first.
/// Insertion order is timestamp order, so both evictions pop the front.
#[derive(Debug)]
pub struct EventCache {
    ttl: Duration,
    capacity: usize,
    order: VecDeque<(String, Instant)>,
    seen: HashSet<String>,
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl EventCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ttl,
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
        }
    }

    /// Returns `true` if `event_id` is new at `now` and records it, `false`
    /// if it is a repeat.
    pub fn check_and_record(&mut self, event_id: &str, now: Instant) -> bool {
        self.evict_expired(now);
        if self.seen.contains(event_id) {
            return false;
        }

        self.seen.insert(event_id.to_string());
        self.order.push_back((event_id.to_string(), now));
        while self.order.len() > self.capacity {
            self.pop_oldest();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((_, recorded)) = self.order.front()
            && now.saturating_duration_since(*recorded) >= self.ttl
        {
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) {
        if let Some((id, _)) = self.order.pop_front() {
            self.seen.remove(&id);
        }
    }
}
