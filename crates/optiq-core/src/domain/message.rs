//! Queue message record and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{MessageId, WorkerId};

/// Persisted message status.
///
/// State transitions:
/// - Pending -> Processing (claim)
/// - Processing -> Processing (reclaim after lease expiry)
/// - Processing -> Pending (retry with backoff, `visible_at` in the future)
/// - Processing -> Completed
/// - Processing -> Dead (retry budget exhausted)
///
/// "failed" is not a persisted status here; see `QueueStats::failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Completed,
    Dead,
}

impl MessageStatus {
    /// No further transitions happen from a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Dead)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Processing => "processing",
            MessageStatus::Completed => "completed",
            MessageStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work.
///
/// `id` and `payload` are fixed at enqueue time. Everything else changes
/// only through a [`MessagePatch`] applied by a conditional write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: MessageId,
    pub payload: serde_json::Value,
    pub status: MessageStatus,

    /// Incremented exactly once per successful claim.
    pub attempts: u32,
    pub max_attempts: u32,

    /// Not claimable before this instant. `None` means visible now.
    pub visible_at: Option<DateTime<Utc>>,

    /// Holder of the current lease. Diagnostic only.
    pub claimed_by: Option<WorkerId>,

    pub last_error: Option<String>,

    pub enqueued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dead_at: Option<DateTime<Utc>>,
}

impl QueueMessage {
    /// A fresh pending message, visible immediately.
    pub fn new(
        id: MessageId,
        payload: serde_json::Value,
        max_attempts: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payload,
            status: MessageStatus::Pending,
            attempts: 0,
            max_attempts,
            visible_at: None,
            claimed_by: None,
            last_error: None,
            enqueued_at,
            completed_at: None,
            dead_at: None,
        }
    }

    /// Whether the retry budget is used up.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Pending and past any backoff delay.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MessageStatus::Pending && self.visible_at.is_none_or(|at| now >= at)
    }

    /// Processing, but the holder's lease has run out.
    pub fn lease_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MessageStatus::Processing && self.visible_at.is_none_or(|at| now >= at)
    }

    /// Apply a patch in place. Fields left as `None` in the patch are kept.
    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempts) = patch.attempts {
            self.attempts = attempts;
        }
        if let Some(visible_at) = patch.visible_at {
            self.visible_at = visible_at;
        }
        if let Some(claimed_by) = patch.claimed_by {
            self.claimed_by = claimed_by;
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = last_error.clone();
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(dead_at) = patch.dead_at {
            self.dead_at = Some(dead_at);
        }
    }
}

/// Partial update of the mutable message fields.
///
/// Nested `Option`s distinguish "leave unchanged" (`None`) from
/// "clear" (`Some(None)`). `id` and `payload` are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    pub status: Option<MessageStatus>,
    pub attempts: Option<u32>,
    pub visible_at: Option<Option<DateTime<Utc>>>,
    pub claimed_by: Option<Option<WorkerId>>,
    pub last_error: Option<Option<String>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dead_at: Option<DateTime<Utc>>,
}

impl MessagePatch {
    /// Take a lease: processing, hidden until `visible_at`, one more attempt.
    pub fn claim(worker: WorkerId, attempts: u32, visible_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(MessageStatus::Processing),
            attempts: Some(attempts),
            visible_at: Some(Some(visible_at)),
            claimed_by: Some(Some(worker)),
            ..Self::default()
        }
    }

    pub fn complete(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(MessageStatus::Completed),
            completed_at: Some(now),
            visible_at: Some(None),
            ..Self::default()
        }
    }

    /// Back to pending, hidden until the backoff elapses.
    pub fn retry(visible_at: DateTime<Utc>, error: String) -> Self {
        Self {
            status: Some(MessageStatus::Pending),
            visible_at: Some(Some(visible_at)),
            claimed_by: Some(None),
            last_error: Some(Some(error)),
            ..Self::default()
        }
    }

    pub fn dead(now: DateTime<Utc>, error: String) -> Self {
        Self {
            status: Some(MessageStatus::Dead),
            dead_at: Some(now),
            visible_at: Some(None),
            last_error: Some(Some(error)),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn message() -> QueueMessage {
        QueueMessage::new(
            MessageId::from_ulid(Ulid::new()),
            serde_json::json!({"n": 1}),
            3,
            Utc::now(),
        )
    }

    #[test]
    fn new_message_is_pending_and_visible() {
        let msg = message();
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.attempts, 0);
        assert!(msg.visible_at.is_none());
        assert!(!msg.attempts_exhausted());
    }

    #[test]
    fn claim_patch_sets_lease_fields() {
        let mut msg = message();
        let worker = WorkerId::from_ulid(Ulid::new());
        let until = Utc::now();
        msg.apply(&MessagePatch::claim(worker, 1, until));

        assert_eq!(msg.status, MessageStatus::Processing);
        assert_eq!(msg.attempts, 1);
        assert_eq!(msg.visible_at, Some(until));
        assert_eq!(msg.claimed_by, Some(worker));
    }

    #[test]
    fn retry_patch_releases_lease_but_keeps_attempts() {
        let mut msg = message();
        let worker = WorkerId::from_ulid(Ulid::new());
        msg.apply(&MessagePatch::claim(worker, 1, Utc::now()));
        msg.apply(&MessagePatch::retry(Utc::now(), "boom".into()));

        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.attempts, 1);
        assert!(msg.claimed_by.is_none());
        assert_eq!(msg.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut msg = message();
        let before = msg.clone();
        msg.apply(&MessagePatch::default());
        assert_eq!(msg, before);
    }

    #[test]
    fn terminal_statuses() {
        assert!(MessageStatus::Completed.is_terminal());
        assert!(MessageStatus::Dead.is_terminal());
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::Processing.is_terminal());
    }
}
