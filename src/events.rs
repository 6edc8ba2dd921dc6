//! Change feed for the dashboard.
//!
//! Every successful write appends an event; the UI polls `changes.since`
//! with the last cursor it saw and re-fetches the collections that changed.

use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Courses,
    Students,
    Lecturers,
    Results,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Promoted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub seq: u64,
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
    pub at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesPage {
    pub cursor: u64,
    pub truncated: bool,
    pub events: Vec<ChangeEvent>,
}

#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<ChangeEvent>,
    last_seq: u64,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            last_seq: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, collection: Collection, id: impl Into<String>, kind: ChangeKind) -> u64 {
        self.last_seq += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(ChangeEvent {
            seq: self.last_seq,
            collection,
            id: id.into(),
            kind,
            at: chrono::Utc::now().to_rfc3339(),
        });
        self.last_seq
    }

    pub fn cursor(&self) -> u64 {
        self.last_seq
    }

    /// Events after `cursor`, oldest first, at most `limit` of them.
    /// `truncated` is set when events between `cursor` and the oldest
    /// retained one were already dropped.
    pub fn since(&self, cursor: u64, limit: usize) -> ChangesPage {
        let oldest = self.events.front().map(|e| e.seq);
        let truncated = matches!(oldest, Some(first) if first > cursor.saturating_add(1));
        let events: Vec<ChangeEvent> = self
            .events
            .iter()
            .filter(|e| e.seq > cursor)
            .take(limit)
            .cloned()
            .collect();
        // A cursor from before a workspace switch may be ahead of this log.
        let next_cursor = events
            .last()
            .map(|e| e.seq)
            .unwrap_or_else(|| cursor.min(self.last_seq));
        ChangesPage {
            cursor: next_cursor,
            truncated,
            events,
        }
    }
}
