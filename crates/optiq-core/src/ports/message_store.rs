//! MessageStore port.
//!
//! The queue needs exactly four things from the document store: create,
//! versioned get, conditional update, and a cheap aggregate by status.
//! `find_candidates` is the query half of the claim protocol. It may return
//! stale ids; the claim engine re-reads every candidate before writing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    MessageId, MessagePatch, MessageStatus, QueueMessage, StatusCounts, Version, Versioned,
};
use crate::error::StoreError;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write landed; `version` is the record's new tag.
    Applied { version: Version },

    /// Someone wrote first. The record was left untouched.
    VersionConflict { expected: Version, actual: Version },

    /// The record is `completed` or `dead` and accepts no further writes,
    /// even at the current version.
    Terminal { status: MessageStatus },

    NotFound,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }

    pub fn version(&self) -> Option<Version> {
        match self {
            UpdateOutcome::Applied { version } => Some(*version),
            _ => None,
        }
    }
}

/// Versioned document store holding queue messages.
///
/// # Contract
/// - Every successful write produces a new, never reused `Version`.
/// - `update_conditional` compares and writes atomically. This is the only
///   coordination primitive the queue relies on.
/// - Records in a terminal status are immutable: `update_conditional`
///   reports `UpdateOutcome::Terminal` instead of applying the patch.
/// - Transient outages surface as `StoreError::Unavailable`.
///
/// # Thread Safety
/// - `Send + Sync`; one store is shared by every worker of every engine.
///
/// # Implementations
/// - **InMemoryMessageStore**: single process, tests and demos
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a new record and return it with its first version.
    async fn create(&self, message: QueueMessage) -> Result<Versioned<QueueMessage>, StoreError>;

    async fn get(&self, id: MessageId) -> Result<Option<Versioned<QueueMessage>>, StoreError>;

    /// Apply `patch` only if the record is still at `expected` and not
    /// terminal.
    ///
    /// Two calls with the same `expected` version can never both return
    /// `Applied`.
    async fn update_conditional(
        &self,
        id: MessageId,
        patch: &MessagePatch,
        expected: Version,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError>;

    /// Ids of messages that look claimable at `now`: pending and visible, or
    /// processing with an expired lease. At most `limit` ids, oldest first
    /// where the store can manage it.
    async fn find_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageId>, StoreError>;
}
