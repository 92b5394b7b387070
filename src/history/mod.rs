//! Message log and history merge
//!
//! One time-ordered, duplicate-free sequence reconciled from two sources:
//! live broadcast messages appended at the tail and backfill pages merged
//! in at the head. Uniqueness key is the server-assigned message id, which
//! also drives the ordering invariant (strictly ascending ids).

use std::collections::HashSet;

use tracing::debug;

use crate::protocol::HistoryFrame;
use crate::types::ChatMessage;

/// Backward-pagination cursor.
///
/// Advanced only by explicit backfill pages, never by live arrivals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryCursor {
    pub last_seen_id: Option<i64>,
    pub has_more: bool,
}

/// Ordered, deduplicated sequence of chat messages
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    ids: HashSet<i64>,
    cursor: HistoryCursor,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a live message at the tail.
    ///
    /// Messages whose id is already present are dropped (the backfill may
    /// have delivered them first). Returns true if the log changed.
    pub fn append_live(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.mid) {
            debug!(mid = message.mid, "duplicate live message dropped");
            return false;
        }
        // Live arrivals are normally newest; fall back to a sorted insert
        // if the transport delivered them out of order.
        match self.entries.last() {
            Some(last) if last.mid > message.mid => {
                let pos = self.position_for(message.mid);
                self.entries.insert(pos, message);
            }
            _ => self.entries.push(message),
        }
        true
    }

    /// Merge one backfill page (ordered oldest to newest) at the head.
    ///
    /// Ids already present are skipped, so live messages that raced the
    /// fetch are neither duplicated nor reordered, and re-merging the same
    /// page is a no-op. Returns the number of messages inserted.
    pub fn merge_page(&mut self, page: &HistoryFrame) -> usize {
        let mut inserted = 0;
        for message in &page.messages {
            if !self.ids.insert(message.mid) {
                continue;
            }
            let pos = self.position_for(message.mid);
            self.entries.insert(pos, message.clone());
            inserted += 1;
        }

        self.cursor.has_more = page.has_more;
        let page_floor = page
            .last_mid
            .or_else(|| page.messages.first().map(|m| m.mid));
        if let Some(floor) = page_floor {
            self.cursor.last_seen_id = Some(match self.cursor.last_seen_id {
                Some(current) => current.min(floor),
                None => floor,
            });
        }

        debug!(
            inserted,
            page_len = page.messages.len(),
            has_more = page.has_more,
            "history page merged"
        );
        inserted
    }

    fn position_for(&self, mid: i64) -> usize {
        self.entries.partition_point(|m| m.mid < mid)
    }

    /// Messages in ascending id order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn contains(&self, mid: i64) -> bool {
        self.ids.contains(&mid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> &HistoryCursor {
        &self.cursor
    }

    /// Drop all state, e.g. on session teardown
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
        self.cursor = HistoryCursor::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(mid: i64) -> ChatMessage {
        serde_json::from_value(serde_json::json!({
            "mid": mid,
            "content": {"text": format!("msg-{}", mid)},
            "creatorId": 1,
            "creatorEmail": "a@example.com",
            "createDate": "2025-01-15T10:00:00Z"
        }))
        .unwrap()
    }

    fn page(mids: &[i64], has_more: bool) -> HistoryFrame {
        HistoryFrame {
            messages: mids.iter().map(|&m| message(m)).collect(),
            has_more,
            last_mid: mids.first().copied(),
        }
    }

    fn ids(log: &MessageLog) -> Vec<i64> {
        log.messages().iter().map(|m| m.mid).collect()
    }

    #[test]
    fn test_live_append() {
        let mut log = MessageLog::new();
        assert!(log.append_live(message(1)));
        assert!(log.append_live(message(2)));
        assert_eq!(ids(&log), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_live_dropped() {
        let mut log = MessageLog::new();
        assert!(log.append_live(message(5)));
        assert!(!log.append_live(message(5)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_page_after_live_overlap() {
        // Scenario: page [10, 11] arrives after live 11 was already appended
        let mut log = MessageLog::new();
        log.append_live(message(11));

        let inserted = log.merge_page(&page(&[10, 11], false));
        assert_eq!(inserted, 1);
        assert_eq!(ids(&log), vec![10, 11]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut log = MessageLog::new();
        let p = page(&[3, 4, 5], true);

        log.merge_page(&p);
        let once = ids(&log);
        let cursor_once = log.cursor().clone();

        assert_eq!(log.merge_page(&p), 0);
        assert_eq!(ids(&log), once);
        assert_eq!(log.cursor(), &cursor_once);
    }

    #[test]
    fn test_any_interleaving_stays_sorted_and_unique() {
        let mut log = MessageLog::new();
        log.append_live(message(20));
        log.merge_page(&page(&[15, 16], true));
        log.append_live(message(21));
        log.merge_page(&page(&[10, 11, 15], true));
        log.append_live(message(16));

        assert_eq!(ids(&log), vec![10, 11, 15, 16, 20, 21]);
    }

    #[test]
    fn test_cursor_tracks_oldest_page() {
        let mut log = MessageLog::new();
        log.merge_page(&page(&[30, 31], true));
        assert_eq!(log.cursor().last_seen_id, Some(30));
        assert!(log.cursor().has_more);

        log.merge_page(&page(&[10, 11], false));
        assert_eq!(log.cursor().last_seen_id, Some(10));
        assert!(!log.cursor().has_more);
    }

    #[test]
    fn test_cursor_ignores_live_arrivals() {
        let mut log = MessageLog::new();
        log.append_live(message(99));
        assert_eq!(log.cursor().last_seen_id, None);
        assert!(!log.cursor().has_more);
    }

    #[test]
    fn test_clear() {
        let mut log = MessageLog::new();
        log.merge_page(&page(&[1, 2], true));
        log.clear();
        assert!(log.is_empty());
        assert!(!log.contains(1));
        assert_eq!(log.cursor(), &HistoryCursor::default());
    }
}
