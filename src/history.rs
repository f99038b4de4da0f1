use std::collections::VecDeque;

use crate::messages::StoredMessage;

/// Bounded per-room message log. Oldest messages are evicted as soon as an
/// append pushes the log over capacity, so the bound is never observable as
/// violated from outside.
#[derive(Debug)]
pub struct HistoryRing {
    capacity: usize,
    messages: VecDeque<StoredMessage>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        HistoryRing {
            capacity,
            messages: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn append(&mut self, message: StoredMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Retained messages, oldest first.
    pub fn snapshot(&self) -> Vec<StoredMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut StoredMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
