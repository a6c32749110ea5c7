//! Time-windowed history: the per-user rolling conversation log.
//!
//! Every turn expires `window` after its own timestamp, measured against the
//! clock at the moment of each call. A steadily active conversation keeps its
//! last `window` of turns; an idle one empties out entirely.
//!
//! Eviction is lazy: it runs for one user on every read and every write of that
//! user's log. [`WindowedHistory::purge_expired`] sweeps all users at once and
//! drops logs that ended up empty.

use chatbridge_core::clock::{Clock, SystemClock};
use chatbridge_core::memory::ConversationHistory;
use chatbridge_core::message::{HistoryMessage, Message, Role};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default retention window: three hours.
pub fn default_window() -> TimeDelta {
    TimeDelta::hours(3)
}

/// In-process history store keyed by user id.
///
/// Logs live in a sharded concurrent map: operations on one user hold only
/// that user's shard, so unrelated users proceed independently.
pub struct WindowedHistory {
    clock: Arc<dyn Clock>,
    window: TimeDelta,
    max_entries: Option<usize>,
    logs: DashMap<String, Vec<Message>>,
}

impl WindowedHistory {
    /// Create a store with an explicit clock and retention window.
    pub fn new(clock: Arc<dyn Clock>, window: TimeDelta) -> Self {
        Self {
            clock,
            window,
            max_entries: None,
            logs: DashMap::new(),
        }
    }

    /// Create a store on the wall clock with the default three-hour window.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(SystemClock), default_window())
    }

    /// Keep at most `cap` turns per user, dropping the oldest first.
    pub fn with_max_entries(mut self, cap: usize) -> Self {
        self.max_entries = Some(cap.max(1));
        self
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Retained iff strictly younger than the window.
    fn evict(log: &mut Vec<Message>, now: DateTime<Utc>, window: TimeDelta) {
        log.retain(|m| m.age_at(now) < window);
    }

    /// Unexpired turns for `user_id`, oldest first.
    ///
    /// Creates an empty log for unseen users.
    pub fn get(&self, user_id: &str) -> Vec<HistoryMessage> {
        let now = self.clock.now();
        let mut log = self.logs.entry(user_id.to_string()).or_default();

        let before = log.len();
        Self::evict(&mut log, now, self.window);
        if log.len() < before {
            trace!(user_id, evicted = before - log.len(), "Evicted expired turns on read");
        }

        log.iter().map(Message::to_history).collect()
    }

    /// Record a turn stamped with the current time, then re-apply eviction.
    ///
    /// Stamps never go backwards within one log, even if the clock does.
    pub fn push(&self, user_id: &str, role: Role, content: &str) {
        let now = self.clock.now();
        let mut log = self.logs.entry(user_id.to_string()).or_default();

        let stamp = log.last().map_or(now, |last| now.max(last.timestamp));
        log.push(Message::new(role, content, stamp));
        Self::evict(&mut log, now, self.window);

        if let Some(cap) = self.max_entries {
            if log.len() > cap {
                let excess = log.len() - cap;
                log.drain(..excess);
                trace!(user_id, dropped = excess, "Per-user cap reached, dropped oldest turns");
            }
        }
    }

    /// Evict expired turns for every user and remove logs left empty.
    ///
    /// Returns the number of logs removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.logs.retain(|_, log| {
            Self::evict(log, now, self.window);
            if log.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(removed, remaining = self.logs.len(), "Purged idle conversation logs");
        }
        removed
    }

    /// Number of user logs currently held (including empty ones).
    pub fn user_count(&self) -> usize {
        self.logs.len()
    }

    /// Stored turns for one user, without evicting.
    pub fn message_count(&self, user_id: &str) -> usize {
        self.logs.get(user_id).map_or(0, |log| log.len())
    }
}

impl Default for WindowedHistory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConversationHistory for WindowedHistory {
    fn name(&self) -> &str {
        "windowed"
    }

    fn history(&self, user_id: &str) -> Vec<HistoryMessage> {
        self.get(user_id)
    }

    fn append(&self, user_id: &str, role: Role, content: &str) {
        self.push(user_id, role, content);
    }
}
