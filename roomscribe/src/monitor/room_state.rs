//! Per-room monitoring state
//!
//! Owned by one monitoring session and shared only between its Room Monitor
//! and Generation Scheduler. Never persisted.

use chrono::{DateTime, Utc};

/// Generation deferred by the cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntry {
    pub trigger_message_id: i64,
    pub eligible_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    last_seen_message_id: Option<i64>,
    /// Single-flight guard
    pub is_generating: bool,
    pub last_generation_completed_at: Option<DateTime<Utc>>,
    pending_queue: Vec<PendingEntry>,
    pub is_first_poll: bool,
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomState {
    pub fn new() -> Self {
        Self {
            last_seen_message_id: None,
            is_generating: false,
            last_generation_completed_at: None,
            pending_queue: Vec::new(),
            is_first_poll: true,
        }
    }

    /// Resume from a known high-water mark; no baseline poll is needed
    pub fn resuming_from(last_seen_message_id: i64) -> Self {
        Self {
            last_seen_message_id: Some(last_seen_message_id),
            is_first_poll: false,
            ..Self::new()
        }
    }

    pub fn last_seen_message_id(&self) -> Option<i64> {
        self.last_seen_message_id
    }

    /// Raise the high-water mark; lower ids are ignored
    pub fn advance_to(&mut self, message_id: i64) {
        self.last_seen_message_id = Some(
            self.last_seen_message_id
                .map_or(message_id, |current| current.max(message_id)),
        );
    }

    /// True if the id is above the high-water mark
    pub fn is_unseen(&self, message_id: i64) -> bool {
        self.last_seen_message_id.map_or(true, |last| message_id > last)
    }

    pub fn pending(&self) -> &[PendingEntry] {
        &self.pending_queue
    }

    pub fn is_queued(&self, trigger_message_id: i64) -> bool {
        self.pending_queue
            .iter()
            .any(|e| e.trigger_message_id == trigger_message_id)
    }

    /// Append unless the trigger is already queued; returns whether it was added
    pub fn enqueue(&mut self, trigger_message_id: i64, eligible_at: DateTime<Utc>) -> bool {
        if self.is_queued(trigger_message_id) {
            return false;
        }
        self.pending_queue.push(PendingEntry {
            trigger_message_id,
            eligible_at,
        });
        true
    }

    /// Remove and return entries eligible at `now`, in insertion order
    pub fn take_eligible(&mut self, now: DateTime<Utc>) -> Vec<PendingEntry> {
        let (eligible, waiting): (Vec<_>, Vec<_>) = self
            .pending_queue
            .drain(..)
            .partition(|e| e.eligible_at <= now);
        self.pending_queue = waiting;
        eligible
    }

    /// Put entries back at the front, ahead of anything queued since
    pub fn requeue_front(&mut self, entries: Vec<PendingEntry>) {
        let mut restored: Vec<PendingEntry> = entries
            .into_iter()
            .filter(|e| !self.is_queued(e.trigger_message_id))
            .collect();
        restored.append(&mut self.pending_queue);
        self.pending_queue = restored;
    }
}
