//! Bounded record of alerts already reported by `watch`.
//!
//! Synthetic event ids change with every snapshot, so alerts are keyed on
//! the upstream identity (category + event id) and compared by their
//! last-modified time to spot updates.

use std::collections::VecDeque;

use crate::models::{DisasterEvent, parse_timestamp};

/// Default number of alert keys remembered.
pub const DEFAULT_CAPACITY: usize = 4_096;

/// Outcome of checking an alert against the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    /// Never reported before
    New,
    /// Reported before, but upstream has modified it since
    Updated,
    /// Already reported in this form
    Repeat,
}

impl Seen {
    #[must_use]
    pub fn should_report(self) -> bool {
        !matches!(self, Self::Repeat)
    }
}

#[derive(Debug)]
struct Entry {
    key: String,
    modified_ms: i64,
}

/// Fixed-capacity FIFO of reported alert keys.
#[derive(Debug)]
pub struct AlertLedger {
    entries: VecDeque<Entry>,
    capacity: usize,
    repeats: u64,
}

impl Default for AlertLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AlertLedger {
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            repeats: 0,
        }
    }

    /// Stable identity of an event across snapshots.
    ///
    /// Records without an upstream id fall back to their position.
    #[must_use]
    pub fn key(event: &DisasterEvent) -> String {
        let code = event.event_type.code();
        if event.source_id.is_empty() {
            format!("{code}@{:.4},{:.4}", event.lat, event.lng)
        } else {
            format!("{code}:{}", event.source_id)
        }
    }

    /// Check an alerting event and remember it.
    pub fn check(&mut self, event: &DisasterEvent) -> Seen {
        let key = Self::key(event);
        let modified_ms = event
            .modified
            .as_deref()
            .and_then(parse_timestamp)
            .map_or(0, |t| t.timestamp_millis());

        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            if modified_ms > entry.modified_ms {
                entry.modified_ms = modified_ms;
                return Seen::Updated;
            }
            self.repeats += 1;
            return Seen::Repeat;
        }

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry { key, modified_ms });
        debug_assert!(self.entries.len() <= self.capacity);
        Seen::New
    }

    /// Number of alert keys currently remembered.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    /// Alerts suppressed as repeats so far.
    #[must_use]
    pub fn repeats(&self) -> u64 {
        self.repeats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_event;

    fn alert(source_id: &str, index: usize, modified: Option<&str>) -> DisasterEvent {
        DisasterEvent {
            id: format!("{source_id}-{index}"),
            source_id: source_id.into(),
            modified: modified.map(String::from),
            ..test_event(source_id, 0.0, 0.0)
        }
    }

    #[test]
    fn test_same_upstream_event_across_snapshots() {
        let mut ledger = AlertLedger::new(16);
        assert_eq!(ledger.check(&alert("1001", 0, Some("2024-06-01T00:00:00"))), Seen::New);
        // Different synthetic id, same upstream event
        assert_eq!(ledger.check(&alert("1001", 5, Some("2024-06-01T00:00:00"))), Seen::Repeat);
        assert_eq!(ledger.repeats(), 1);
    }

    #[test]
    fn test_modified_event_reported_again() {
        let mut ledger = AlertLedger::new(16);
        ledger.check(&alert("1001", 0, Some("2024-06-01T00:00:00")));
        assert_eq!(ledger.check(&alert("1001", 0, Some("2024-06-02T00:00:00"))), Seen::Updated);
        assert_eq!(ledger.check(&alert("1001", 0, Some("2024-06-01T12:00:00"))), Seen::Repeat);
        assert_eq!(ledger.tracked(), 1);
    }

    #[test]
    fn test_events_without_upstream_id_stay_distinct() {
        let mut ledger = AlertLedger::new(16);
        let here = DisasterEvent {
            source_id: String::new(),
            ..test_event("a", 12.97, 77.59)
        };
        let there = DisasterEvent {
            source_id: String::new(),
            ..test_event("b", 13.08, 80.27)
        };
        assert_eq!(ledger.check(&here), Seen::New);
        assert_eq!(ledger.check(&there), Seen::New);
        assert_eq!(ledger.check(&here), Seen::Repeat);
        assert_ne!(AlertLedger::key(&here), AlertLedger::key(&there));
    }

    #[test]
    fn test_bounded_capacity() {
        let mut ledger = AlertLedger::new(2);
        ledger.check(&alert("a", 0, None));
        ledger.check(&alert("b", 0, None));
        ledger.check(&alert("c", 0, None));
        assert_eq!(ledger.tracked(), 2);

        // "a" was evicted
        assert_eq!(ledger.check(&alert("a", 0, None)), Seen::New);
        assert!(!Seen::Repeat.should_report());
        assert!(Seen::Updated.should_report());
    }
}
