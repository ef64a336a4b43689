//! Bounded, most-recent-first message history with since-cursor reads.

use super::MAX_HIST;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::collections::VecDeque;

/// One broadcast message, stored by value.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub nick: Vec<u8>,
    pub body: Vec<u8>,
    /// Unix seconds. Stored as a plain timestamp (rather than a
    /// `DateTime`) so formatting it back out at `new`-time can fail in a
    /// typed way if the value is ever out of `chrono`'s representable
    /// range, matching the "close the connection on format failure"
    /// contract.
    pub timestamp: i64,
}

/// Bounded ring of recent messages, `entries[0]` is the newest.
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        History {
            entries: VecDeque::with_capacity(MAX_HIST),
        }
    }

    /// Insert a new entry at the front, discarding the oldest if the ring
    /// is already at capacity.
    pub fn append(&mut self, nick: Vec<u8>, body: Vec<u8>, now: i64) {
        self.entries.push_front(HistoryEntry {
            nick,
            body,
            timestamp: now,
        });
        if self.entries.len() > MAX_HIST {
            self.entries.pop_back();
        }
    }

    /// Entries strictly newer than `cursor`, oldest-first among them, plus
    /// their count. Reading twice with no intervening `append` returns an
    /// empty iterator both times: the comparison is strict.
    pub fn since(&self, cursor: i64) -> (usize, impl Iterator<Item = &HistoryEntry>) {
        let newer: Vec<&HistoryEntry> = self
            .entries
            .iter()
            .rev()
            .filter(move |e| e.timestamp > cursor)
            .collect();
        (newer.len(), newer.into_iter())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Current wall-clock time as Unix seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Format a timestamp as a local `HH:MM:SS` string. Returns `None` if the
/// timestamp is outside the range `chrono` can represent as a calendar
/// date, which is the failure `new`'s connection-closing path guards
/// against.
pub fn format_local_time(timestamp: i64) -> Option<String> {
    let utc: DateTime<Utc> = Utc.timestamp_opt(timestamp, 0).single()?;
    Some(utc.with_timezone(&Local).format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_discards_oldest_past_capacity() {
        let mut history = History::new();
        for i in 0..(MAX_HIST + 5) {
            history.append(b"n".to_vec(), format!("msg{i}").into_bytes(), i as i64);
        }
        assert_eq!(history.len(), MAX_HIST);

        let (count, mut entries) = history.since(-1);
        assert_eq!(count, MAX_HIST);
        // Oldest surviving entry is msg5 (0..5 were evicted).
        assert_eq!(entries.next().unwrap().body, b"msg5");
    }

    #[test]
    fn since_is_strict_and_oldest_first() {
        let mut history = History::new();
        history.append(b"a".to_vec(), b"one".to_vec(), 10);
        history.append(b"a".to_vec(), b"two".to_vec(), 20);

        let (count, entries) = history.since(10);
        let bodies: Vec<&[u8]> = entries.map(|e| e.body.as_slice()).collect();
        assert_eq!(count, 1);
        assert_eq!(bodies, vec![b"two".as_slice()]);
    }

    #[test]
    fn since_returns_zero_with_no_new_messages() {
        let mut history = History::new();
        history.append(b"a".to_vec(), b"one".to_vec(), 10);

        let (count, _) = history.since(10);
        assert_eq!(count, 0);
    }

    #[test]
    fn empty_history_returns_zero() {
        let history = History::new();
        let (count, _) = history.since(0);
        assert_eq!(count, 0);
    }

    #[test]
    fn multiple_messages_come_back_in_insertion_order() {
        let mut history = History::new();
        history.append(b"a".to_vec(), b"one".to_vec(), 1);
        history.append(b"a".to_vec(), b"two".to_vec(), 2);
        history.append(b"a".to_vec(), b"three".to_vec(), 3);

        let (count, entries) = history.since(0);
        let bodies: Vec<&[u8]> = entries.map(|e| e.body.as_slice()).collect();
        assert_eq!(count, 3);
        assert_eq!(bodies, vec![b"one".as_slice(), b"two", b"three"]);
    }

    #[test]
    fn format_local_time_renders_hh_mm_ss() {
        let formatted = format_local_time(0).unwrap();
        assert_eq!(formatted.len(), 8);
        assert_eq!(formatted.as_bytes()[2], b':');
        assert_eq!(formatted.as_bytes()[5], b':');
    }
}
