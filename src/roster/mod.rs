//! Online roster reconciliation
//!
//! Maintains the authoritative online-user set from a wholesale snapshot
//! plus incremental join/leave deltas. The snapshot arrives on the private
//! topic and deltas on the public topic; no relative order is guaranteed
//! between the two, so both operations are idempotent set operations.

use std::collections::BTreeMap;

use tracing::debug;

use crate::protocol::{StatisticsFrame, StatusChangeFrame, UserChangeStatus};
use crate::types::UserEntry;

/// Reconciled view of who is online
#[derive(Debug, Default)]
pub struct RosterStore {
    /// Named online users, keyed by user id
    entries: BTreeMap<i64, UserEntry>,
    /// Total online count from the last snapshot, anonymous sessions included
    online_count: u32,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster from a statistics snapshot
    pub fn apply_snapshot(&mut self, snapshot: &StatisticsFrame) {
        self.entries = snapshot
            .users
            .iter()
            .map(|user| (user.id, user.clone()))
            .collect();
        self.online_count = snapshot.online;
        debug!(
            online = self.online_count,
            named = self.entries.len(),
            "roster snapshot applied"
        );
    }

    /// Apply a join/leave delta.
    ///
    /// Duplicate joins and leaves of unknown users are no-ops; a delta for
    /// an anonymous session never mutates the roster. Returns true if the
    /// entry set changed.
    pub fn apply_delta(&mut self, delta: &StatusChangeFrame) -> bool {
        if delta.anonymous {
            return false;
        }
        match delta.status {
            UserChangeStatus::Join => {
                if self.entries.contains_key(&delta.id) {
                    return false;
                }
                self.entries.insert(
                    delta.id,
                    UserEntry {
                        id: delta.id,
                        nickname: delta.nickname.clone(),
                        email: delta.email.clone(),
                        avatar: None,
                    },
                );
                debug!(user_id = delta.id, "roster join");
                true
            }
            UserChangeStatus::Leave => {
                let removed = self.entries.remove(&delta.id).is_some();
                if removed {
                    debug!(user_id = delta.id, "roster leave");
                }
                removed
            }
        }
    }

    /// Named online users, ordered by user id
    pub fn entries(&self) -> Vec<UserEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total online count from the last snapshot
    pub fn online_count(&self) -> u32 {
        self.online_count
    }

    /// Anonymous sessions online, derived as `online_count - named entries`.
    ///
    /// Authoritative only at snapshot time; between deltas and the next
    /// snapshot this is an approximation.
    pub fn anonymous_count(&self) -> u32 {
        self.online_count.saturating_sub(self.entries.len() as u32)
    }

    /// Drop all state, e.g. on session teardown
    pub fn clear(&mut self) {
        self.entries.clear();
        self.online_count = 0;
    }
}
