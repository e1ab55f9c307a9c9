//! The bounded session log.
//!
//! Only the coordinator writes to it. Entries are kept ordered by the
//! producer's capture stamp and the oldest entries are evicted once the
//! capacity is exceeded. It is a lossy buffer, not a durable store.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::action::ActionRecord;
use crate::clock::CaptureStamp;
use crate::page::ContextId;

/// Default number of entries the log holds.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Key under which the log is persisted in the key-value store.
pub const PERSISTED_LOG_KEY: &str = "workflowActions";

/// One appended record plus where and when the coordinator received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub action: ActionRecord,
    pub origin: ContextId,
    pub server_timestamp: CaptureStamp,
}

impl LogEntry {
    pub fn new(action: ActionRecord, origin: ContextId, server_timestamp: CaptureStamp) -> Self {
        Self {
            action,
            origin,
            server_timestamp,
        }
    }

    /// Identity used to recognise a re-sent record.
    pub fn same_record(&self, other: &LogEntry) -> bool {
        self.origin == other.origin && self.action.captured_at() == other.action.captured_at()
    }
}

/// What happened to an appended entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored; `evicted` older entries were dropped to stay within capacity.
    Appended { evicted: usize },

    /// A record with the same origin and capture stamp is already stored.
    Duplicate,
}

/// Capacity-bounded log ordered by capture stamp.
#[derive(Debug, Clone)]
pub struct SessionLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl SessionLog {
    /// Creates an empty log. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuilds a log from previously persisted entries.
    pub fn from_entries(entries: Vec<LogEntry>, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        for entry in entries {
            log.append(entry);
        }
        log
    }

    /// Inserts `entry` in capture-stamp order, then evicts from the front
    /// until the log is back within capacity.
    pub fn append(&mut self, entry: LogEntry) -> AppendOutcome {
        if self.entries.iter().any(|existing| existing.same_record(&entry)) {
            return AppendOutcome::Duplicate;
        }

        let stamp = entry.action.captured_at();
        let position = self
            .entries
            .iter()
            .rposition(|existing| existing.action.captured_at() <= stamp)
            .map_or(0, |idx| idx + 1);
        self.entries.insert(position, entry);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        AppendOutcome::Appended { evicted }
    }

    /// Entries whose server timestamp is after `watermark`, oldest first.
    pub fn since(&self, watermark: Option<CaptureStamp>) -> Vec<LogEntry> {
        let mut fresh: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|e| watermark.map_or(true, |w| e.server_timestamp > w))
            .cloned()
            .collect();
        fresh.sort_by_key(|e| e.server_timestamp);
        fresh
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Highest server timestamp in the log.
    pub fn latest_server_timestamp(&self) -> Option<CaptureStamp> {
        self.entries.iter().map(|e| e.server_timestamp).max()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::page::PageIdentity;

    fn entry(origin: &str, captured: i64, server: i64) -> LogEntry {
        let page = PageIdentity::new("https://example.com", "Example");
        let action = ActionRecord::new(
            ActionKind::Click,
            format!("Click {captured}"),
            "",
            CaptureStamp::from_millis(captured),
            &page,
        );
        LogEntry::new(action, ContextId::new(origin), CaptureStamp::from_millis(server))
    }

    #[test]
    fn test_append_105_keeps_last_100_in_order() {
        let mut log = SessionLog::default();
        for i in 0..105 {
            log.append(entry("tab-1", i, i));
        }
        assert_eq!(log.len(), 100);
        let stamps: Vec<i64> = log.iter().map(|e| e.action.captured_at().as_millis()).collect();
        let expected: Vec<i64> = (5..105).collect();
        assert_eq!(stamps, expected);
    }

    #[test]
    fn test_eviction_count_is_reported() {
        let mut log = SessionLog::new(2);
        assert_eq!(log.append(entry("a", 1, 1)), AppendOutcome::Appended { evicted: 0 });
        assert_eq!(log.append(entry("a", 2, 2)), AppendOutcome::Appended { evicted: 0 });
        assert_eq!(log.append(entry("a", 3, 3)), AppendOutcome::Appended { evicted: 1 });
    }

    #[test]
    fn test_late_arrival_is_ordered_by_capture_stamp() {
        let mut log = SessionLog::default();
        log.append(entry("tab-1", 10, 100));
        log.append(entry("tab-1", 30, 101));
        log.append(entry("tab-2", 20, 102));

        let stamps: Vec<i64> = log.iter().map(|e| e.action.captured_at().as_millis()).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
    }

    #[test]
    fn test_resend_of_same_record_is_duplicate() {
        let mut log = SessionLog::default();
        log.append(entry("tab-1", 10, 100));
        assert_eq!(log.append(entry("tab-1", 10, 105)), AppendOutcome::Duplicate);
        // Same stamp from a different context is a different record.
        assert!(matches!(log.append(entry("tab-2", 10, 106)), AppendOutcome::Appended { .. }));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_since_filters_and_sorts_by_server_timestamp() {
        let mut log = SessionLog::default();
        log.append(entry("tab-1", 10, 100));
        log.append(entry("tab-1", 30, 101));
        log.append(entry("tab-2", 20, 102));

        let all: Vec<i64> = log.since(None).iter().map(|e| e.server_timestamp.as_millis()).collect();
        assert_eq!(all, vec![100, 101, 102]);

        let fresh = log.since(Some(CaptureStamp::from_millis(100)));
        assert_eq!(fresh.len(), 2);
        assert!(log.since(log.latest_server_timestamp()).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = SessionLog::new(0);
        log.append(entry("a", 1, 1));
        log.append(entry("a", 2, 2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.len(), 1);
    }
}
