//! Retry & dead-letter router.
//!
//! Applies a handler outcome to a claimed message. Every write here is
//! conditioned on the version the claim produced, so a worker whose lease
//! expired and was taken over cannot complete, retry or bury the message
//! behind the new holder's back. Such writes come back as
//! [`Disposition::LeaseLost`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{ClaimedMessage, LeaseManager, Notifier};
use crate::domain::{DeadLetterRecord, MessagePatch, QueueEvent, QueueMessage, Version, Versioned};
use crate::error::{HandlerError, StoreError};
use crate::observability::lifecycle;
use crate::ports::{DeadLetterStore, IdGenerator, MessageStore, UpdateOutcome};

pub(crate) const EXPIRED_FINAL_LEASE: &str = "lease expired on final attempt";

/// Where a message ended up after the router ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Retrying { visible_at: DateTime<Utc> },
    DeadLettered,
    /// The lease was no longer ours; nothing was written.
    LeaseLost,
}

#[derive(Clone)]
pub struct Router {
    store: Arc<dyn MessageStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    dead_letter_resource: String,
    lease: LeaseManager,
    ids: Arc<dyn IdGenerator>,
    notifier: Notifier,
    verbose: bool,
}

impl Router {
    pub fn new(
        store: Arc<dyn MessageStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        dead_letter_resource: impl Into<String>,
        lease: LeaseManager,
        ids: Arc<dyn IdGenerator>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            dead_letters,
            dead_letter_resource: dead_letter_resource.into(),
            lease,
            ids,
            notifier,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn dead_letter_resource(&self) -> &str {
        &self.dead_letter_resource
    }

    /// Handler succeeded.
    pub async fn complete(
        &self,
        claimed: &ClaimedMessage,
        duration: Duration,
    ) -> Result<Disposition, StoreError> {
        let id = claimed.id();
        let patch = MessagePatch::complete(self.lease.now());
        match self.store.update_conditional(id, &patch, claimed.version).await? {
            UpdateOutcome::Applied { .. } => {
                lifecycle!(
                    self.verbose,
                    message_id = %id,
                    attempts = claimed.attempts(),
                    duration_ms = duration.as_millis() as u64,
                    "message completed"
                );
                self.notifier.publish(QueueEvent::Completed {
                    id,
                    attempts: claimed.attempts(),
                    duration,
                });
                Ok(Disposition::Completed)
            }
            outcome => Ok(self.lease_lost(claimed, "complete", outcome)),
        }
    }

    /// Handler failed: retry with backoff, or dead-letter once the budget is
    /// spent.
    pub async fn fail(
        &self,
        claimed: &ClaimedMessage,
        error: &HandlerError,
    ) -> Result<Disposition, StoreError> {
        if claimed.message.attempts_exhausted() {
            return self
                .dead_letter(&claimed.message, claimed.version, error.to_string())
                .await;
        }

        let id = claimed.id();
        let attempts = claimed.attempts();
        let visible_at = self.lease.retry_at(attempts);
        let patch = MessagePatch::retry(visible_at, error.to_string());
        match self.store.update_conditional(id, &patch, claimed.version).await? {
            UpdateOutcome::Applied { .. } => {
                lifecycle!(
                    self.verbose,
                    message_id = %id,
                    attempts,
                    max_attempts = claimed.message.max_attempts,
                    %visible_at,
                    error = %error,
                    "message scheduled for retry"
                );
                self.notifier.publish(QueueEvent::Retry {
                    id,
                    attempts,
                    visible_at,
                    error: error.to_string(),
                });
                Ok(Disposition::Retrying { visible_at })
            }
            outcome => Ok(self.lease_lost(claimed, "retry", outcome)),
        }
    }

    /// Dead-letter a message whose final lease expired without an outcome.
    pub async fn bury_exhausted(
        &self,
        message: Versioned<QueueMessage>,
    ) -> Result<Disposition, StoreError> {
        let (message, version) = message.into_parts();
        let error = message
            .last_error
            .clone()
            .map(|last| format!("{EXPIRED_FINAL_LEASE} (previous attempt: {last})"))
            .unwrap_or_else(|| EXPIRED_FINAL_LEASE.to_string());
        self.dead_letter(&message, version, error).await
    }

    /// Write the companion record, then mark the original dead.
    ///
    /// The version is re-checked right before the record is written so that a
    /// worker that already lost its lease does not leave a stray record.
    /// Repeating the whole call after a store outage is safe: the insert is
    /// idempotent per `(original_id, attempts)`.
    async fn dead_letter(
        &self,
        message: &QueueMessage,
        version: Version,
        error: String,
    ) -> Result<Disposition, StoreError> {
        let id = message.id;
        match self.store.get(id).await? {
            Some(current) if current.version == version => {}
            _ => {
                tracing::debug!(message_id = %id, "lease lost before dead-lettering");
                return Ok(Disposition::LeaseLost);
            }
        }

        let now = self.lease.now();
        let record = DeadLetterRecord::from_message(
            self.ids.generate_dead_letter_id(),
            message,
            error.clone(),
            now,
        );
        self.dead_letters
            .insert(&self.dead_letter_resource, record)
            .await?;

        let patch = MessagePatch::dead(now, error.clone());
        match self.store.update_conditional(id, &patch, version).await? {
            UpdateOutcome::Applied { .. } => {
                tracing::warn!(
                    message_id = %id,
                    attempts = message.attempts,
                    resource = %self.dead_letter_resource,
                    error = %error,
                    "message dead-lettered"
                );
                self.notifier.publish(QueueEvent::Dead {
                    id,
                    attempts: message.attempts,
                    error,
                });
                Ok(Disposition::DeadLettered)
            }
            outcome => {
                tracing::warn!(
                    message_id = %id,
                    ?outcome,
                    "dead-letter record written but lease was lost"
                );
                Ok(Disposition::LeaseLost)
            }
        }
    }

    fn lease_lost(
        &self,
        claimed: &ClaimedMessage,
        action: &'static str,
        outcome: UpdateOutcome,
    ) -> Disposition {
        tracing::debug!(
            message_id = %claimed.id(),
            worker_id = %claimed.worker_id,
            action,
            ?outcome,
            "lease lost before terminal write"
        );
        Disposition::LeaseLost
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("dead_letter_resource", &self.dead_letter_resource)
            .field("lease", &self.lease)
            .field("verbose", &self.verbose)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessageStatus};
    use crate::impls::{InMemoryDeadLetterStore, InMemoryMessageStore};
    use crate::ports::{Clock, FixedClock, SystemClock, UlidGenerator};
    use crate::queue::{ClaimEngine, ClaimResult, FixedBackoff};
    use chrono::TimeZone;

    const DLQ: &str = "dead_letters";

    struct Fixture {
        store: Arc<InMemoryMessageStore>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
        clock: Arc<FixedClock>,
        notifier: Notifier,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryMessageStore::new()),
                dead_letters: Arc::new(InMemoryDeadLetterStore::with_resource(DLQ)),
                clock: Arc::new(FixedClock::new(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                )),
                notifier: Notifier::new(16),
            }
        }

        fn lease(&self) -> LeaseManager {
            LeaseManager::new(
                self.clock.clone(),
                Duration::from_millis(1000),
                Arc::new(FixedBackoff::new(Duration::from_millis(200))),
            )
        }

        fn router(&self) -> Router {
            Router::new(
                self.store.clone(),
                self.dead_letters.clone(),
                DLQ,
                self.lease(),
                Arc::new(UlidGenerator::new(SystemClock)),
                self.notifier.clone(),
            )
        }

        fn claimer(&self) -> ClaimEngine {
            let worker = UlidGenerator::new(SystemClock).generate_worker_id();
            ClaimEngine::new(self.store.clone(), self.lease(), worker)
        }

        async fn enqueue(&self, max_attempts: u32) -> MessageId {
            let id = UlidGenerator::new(SystemClock).generate_message_id();
            let msg = QueueMessage::new(
                id,
                serde_json::json!({"job": "x"}),
                max_attempts,
                self.clock.now(),
            );
            self.store.create(msg).await.unwrap();
            id
        }

        async fn claim(&self, id: MessageId) -> ClaimedMessage {
            match self.claimer().try_claim(id).await.unwrap() {
                ClaimResult::Claimed(claimed) => claimed,
                other => panic!("expected claim, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn complete_marks_completed_and_notifies() {
        let fx = Fixture::new();
        let mut events = fx.notifier.subscribe();
        let id = fx.enqueue(3).await;
        let claimed = fx.claim(id).await;

        let disposition = fx
            .router()
            .complete(&claimed, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Completed);

        let stored = fx.store.get(id).await.unwrap().unwrap().value;
        assert_eq!(stored.status, MessageStatus::Completed);
        assert_eq!(stored.completed_at, Some(fx.clock.now()));
        assert_eq!(
            events.recv().await.unwrap(),
            QueueEvent::Completed {
                id,
                attempts: 1,
                duration: Duration::from_millis(5)
            }
        );
    }

    #[tokio::test]
    async fn failure_below_budget_schedules_retry() {
        let fx = Fixture::new();
        let id = fx.enqueue(3).await;
        let claimed = fx.claim(id).await;

        let disposition = fx
            .router()
            .fail(&claimed, &HandlerError::new("boom"))
            .await
            .unwrap();
        let expected_at = fx.clock.now() + chrono::Duration::milliseconds(200);
        assert_eq!(
            disposition,
            Disposition::Retrying {
                visible_at: expected_at
            }
        );

        let stored = fx.store.get(id).await.unwrap().unwrap().value;
        assert_eq!(stored.status, MessageStatus::Pending);
        assert_eq!(stored.visible_at, Some(expected_at));
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn failure_on_last_attempt_dead_letters() {
        let fx = Fixture::new();
        let mut events = fx.notifier.subscribe();
        let id = fx.enqueue(1).await;
        let claimed = fx.claim(id).await;

        let disposition = fx
            .router()
            .fail(&claimed, &HandlerError::new("fatal"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::DeadLettered);

        let stored = fx.store.get(id).await.unwrap().unwrap().value;
        assert_eq!(stored.status, MessageStatus::Dead);
        assert!(stored.dead_at.is_some());

        let records = fx.dead_letters.list(DLQ).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_id, id);
        assert_eq!(records[0].attempts, 1);
        assert_eq!(records[0].last_error, "fatal");
        assert_eq!(records[0].payload, serde_json::json!({"job": "x"}));

        assert!(matches!(
            events.recv().await.unwrap(),
            QueueEvent::Dead { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn stale_holder_cannot_complete_after_reclaim() {
        let fx = Fixture::new();
        let id = fx.enqueue(3).await;
        let first = fx.claim(id).await;

        fx.clock.advance(Duration::from_millis(1000));
        let second = fx.claim(id).await;
        assert_eq!(second.attempts(), 2);

        let router = fx.router();
        assert_eq!(
            router.complete(&first, Duration::ZERO).await.unwrap(),
            Disposition::LeaseLost
        );
        assert_eq!(
            router.fail(&first, &HandlerError::new("late")).await.unwrap(),
            Disposition::LeaseLost
        );
        assert_eq!(
            router.complete(&second, Duration::ZERO).await.unwrap(),
            Disposition::Completed
        );
    }

    #[tokio::test]
    async fn stale_holder_does_not_write_dead_letter() {
        let fx = Fixture::new();
        let id = fx.enqueue(1).await;
        let first = fx.claim(id).await;

        // someone else finishes it after the lease expired
        fx.clock.advance(Duration::from_millis(1000));
        let current = fx.store.get(id).await.unwrap().unwrap();
        fx.store
            .update_conditional(id, &MessagePatch::complete(fx.clock.now()), current.version)
            .await
            .unwrap();

        assert_eq!(
            fx.router()
                .fail(&first, &HandlerError::new("late"))
                .await
                .unwrap(),
            Disposition::LeaseLost
        );
        assert!(fx.dead_letters.list(DLQ).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_lease_is_buried() {
        let fx = Fixture::new();
        let id = fx.enqueue(1).await;
        fx.claim(id).await;
        fx.clock.advance(Duration::from_millis(1000));

        let batch = fx.claimer().claim_batch(5).await.unwrap();
        assert_eq!(batch.exhausted.len(), 1);

        let disposition = fx
            .router()
            .bury_exhausted(batch.exhausted.into_iter().next().unwrap())
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::DeadLettered);

        let records = fx.dead_letters.list(DLQ).await.unwrap();
        assert_eq!(records[0].last_error, EXPIRED_FINAL_LEASE);
        assert!(fx.claimer().claim_batch(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buried_record_labels_the_earlier_error() {
        let fx = Fixture::new();
        let id = fx.enqueue(2).await;
        let first = fx.claim(id).await;
        fx.router()
            .fail(&first, &HandlerError::new("boom"))
            .await
            .unwrap();

        fx.clock.advance(Duration::from_millis(200));
        fx.claim(id).await;
        fx.clock.advance(Duration::from_millis(1000));

        let batch = fx.claimer().claim_batch(5).await.unwrap();
        let exhausted = batch.exhausted.into_iter().next().unwrap();
        fx.router().bury_exhausted(exhausted).await.unwrap();

        let records = fx.dead_letters.list(DLQ).await.unwrap();
        assert_eq!(records[0].attempts, 2);
        assert_eq!(
            records[0].last_error,
            "lease expired on final attempt (previous attempt: boom)"
        );
    }
}
