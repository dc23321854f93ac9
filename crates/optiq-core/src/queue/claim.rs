//! Claim engine: turns the shared backlog into exclusively owned work.
//!
//! Ownership comes from a single conditional write. Per candidate:
//! 1. read `(message, version)`
//! 2. re-check it is claimable (the candidate list may be stale)
//! 3. `update_conditional(id, claim patch, version)`
//!
//! If step 3 applies, this worker owns the message until `visible_at`. If it
//! conflicts, someone else touched the message after step 1; the candidate is
//! dropped for this cycle. That race is expected and is logged at `trace`.

use std::sync::Arc;

use tokio::time::Instant;

use super::LeaseManager;
use crate::domain::{MessageId, MessagePatch, QueueMessage, Version, Versioned, WorkerId};
use crate::error::StoreError;
use crate::ports::{MessageStore, UpdateOutcome};

/// A message this worker holds a lease on.
#[derive(Debug, Clone)]
pub struct ClaimedMessage {
    /// State as written by the claim.
    pub message: QueueMessage,
    /// Version produced by the claim write. Terminal writes are conditioned
    /// on it, so they fail if the lease was lost to another worker.
    pub version: Version,
    pub worker_id: WorkerId,
    pub claimed_at: Instant,
}

impl ClaimedMessage {
    pub fn id(&self) -> MessageId {
        self.message.id
    }

    pub fn attempts(&self) -> u32 {
        self.message.attempts
    }
}

#[derive(Debug, Clone)]
pub enum ClaimResult {
    Claimed(ClaimedMessage),

    /// Lost the race: the record changed between read and write.
    Conflict,

    /// Not pending-and-visible, and no expired lease either.
    NotClaimable,

    /// Lease expired on the final attempt. Claiming again would exceed
    /// `max_attempts`, so the message goes to the dead-letter path instead.
    Exhausted(Versioned<QueueMessage>),

    Missing,
}

/// Outcome of one poll cycle.
#[derive(Debug, Default)]
pub struct ClaimBatch {
    pub claimed: Vec<ClaimedMessage>,
    pub exhausted: Vec<Versioned<QueueMessage>>,
    pub conflicts: usize,
}

impl ClaimBatch {
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty() && self.exhausted.is_empty()
    }
}

#[derive(Clone)]
pub struct ClaimEngine {
    store: Arc<dyn MessageStore>,
    lease: LeaseManager,
    worker_id: WorkerId,
}

impl ClaimEngine {
    pub fn new(store: Arc<dyn MessageStore>, lease: LeaseManager, worker_id: WorkerId) -> Self {
        Self {
            store,
            lease,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn lease(&self) -> &LeaseManager {
        &self.lease
    }

    /// Try to take a lease on one message.
    pub async fn try_claim(&self, id: MessageId) -> Result<ClaimResult, StoreError> {
        let Some(current) = self.store.get(id).await? else {
            return Ok(ClaimResult::Missing);
        };
        let (mut message, version) = current.into_parts();

        if !self.lease.is_claimable(&message) {
            return Ok(ClaimResult::NotClaimable);
        }
        if message.attempts_exhausted() {
            return Ok(ClaimResult::Exhausted(Versioned::new(message, version)));
        }

        let patch = MessagePatch::claim(
            self.worker_id,
            message.attempts + 1,
            self.lease.lease_deadline(),
        );
        match self.store.update_conditional(id, &patch, version).await? {
            UpdateOutcome::Applied { version } => {
                message.apply(&patch);
                tracing::trace!(
                    message_id = %id,
                    worker_id = %self.worker_id,
                    attempts = message.attempts,
                    "claimed"
                );
                Ok(ClaimResult::Claimed(ClaimedMessage {
                    message,
                    version,
                    worker_id: self.worker_id,
                    claimed_at: Instant::now(),
                }))
            }
            UpdateOutcome::VersionConflict { expected, actual } => {
                tracing::trace!(
                    message_id = %id,
                    worker_id = %self.worker_id,
                    %expected,
                    %actual,
                    "claim lost race"
                );
                Ok(ClaimResult::Conflict)
            }
            UpdateOutcome::Terminal { .. } => Ok(ClaimResult::NotClaimable),
            UpdateOutcome::NotFound => Ok(ClaimResult::Missing),
        }
    }

    /// Run one poll cycle, claiming up to `max` messages.
    ///
    /// A failing candidate query aborts the cycle with the error. A store
    /// failure after some claims already landed stops the cycle but returns
    /// what was claimed: those leases are held and must be processed.
    pub async fn claim_batch(&self, max: usize) -> Result<ClaimBatch, StoreError> {
        let mut batch = ClaimBatch::default();
        if max == 0 {
            return Ok(batch);
        }

        let candidates = self.store.find_candidates(self.lease.now(), max).await?;
        for id in candidates {
            match self.try_claim(id).await {
                Ok(ClaimResult::Claimed(claimed)) => batch.claimed.push(claimed),
                Ok(ClaimResult::Exhausted(message)) => batch.exhausted.push(message),
                Ok(ClaimResult::Conflict) => batch.conflicts += 1,
                Ok(ClaimResult::NotClaimable | ClaimResult::Missing) => {}
                Err(err) if batch.is_empty() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        claimed = batch.claimed.len(),
                        error = %err,
                        "store failed mid-cycle, keeping claims made so far"
                    );
                    break;
                }
            }
        }
        Ok(batch)
    }
}

impl std::fmt::Debug for ClaimEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimEngine")
            .field("worker_id", &self.worker_id)
            .field("lease", &self.lease)
            .finish()
    }
}
