//! Bounded, newest-first log of agent actions for the control surface.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    capacity: usize,
    entries: VecDeque<String>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        ActivityLog {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, at: NaiveDateTime, message: impl AsRef<str>) {
        let entry = format!("[{}] {}", at.format("%Y-%m-%d %H:%M:%S"), message.as_ref());
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn latest(&self) -> Option<&str> {
        self.entries.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        ActivityLog::new(DEFAULT_CAPACITY)
    }
}
