use std::collections::VecDeque;

use parking_lot::Mutex;
use tickboard_model::OutboundMessage;

/// Ring buffer of the most recent broadcast messages.
///
/// Used for diagnostics and best-effort replay to reconnecting clients. It
/// is not a delivery guarantee: once a message falls off the end it is gone.
#[derive(Debug)]
pub struct EventQueue {
    history: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, message: OutboundMessage) {
        let mut guard = self.history.lock();
        while guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<OutboundMessage> {
        self.history.lock().iter().cloned().collect()
    }

    /// Messages queued after the one carrying `event_id`, oldest first.
    ///
    /// `None` when `event_id` is no longer (or never was) in the queue.
    pub fn messages_after(&self, event_id: &str) -> Option<Vec<OutboundMessage>> {
        let guard = self.history.lock();
        let position = guard
            .iter()
            .position(|message| message.event_id() == Some(event_id))?;
        Some(guard.iter().skip(position + 1).cloned().collect())
    }
}
