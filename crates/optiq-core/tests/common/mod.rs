#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optiq_core::domain::{
    DeadLetterRecord, MessageId, MessagePatch, MessageStatus, QueueMessage, StatusCounts, Version,
    Versioned,
};
use optiq_core::error::StoreError;
use optiq_core::impls::{InMemoryDeadLetterStore, InMemoryMessageStore};
use optiq_core::ports::{DeadLetterStore, MessageStore, UpdateOutcome};
use optiq_core::queue::FixedBackoff;
use optiq_core::{QueueEngine, QueueEngineBuilder};

pub const DLQ: &str = "dead_letters";

/// Store wrapper that can be switched into an outage.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryMessageStore,
    down: Arc<AtomicBool>,
    rejected: Arc<AtomicUsize>,
    fail_write: Arc<Mutex<Option<MessageStatus>>>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryMessageStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Calls refused, by an outage or an armed write failure.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Refuse the next conditional write that moves a record to `status`.
    pub fn fail_next_write(&self, status: MessageStatus) {
        *self.fail_write.lock().unwrap() = Some(status);
    }

    fn check_write(&self, patch: &MessagePatch) -> Result<(), StoreError> {
        let mut armed = self.fail_write.lock().unwrap();
        if patch.status.is_some() && *armed == patch.status {
            *armed = None;
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("simulated write timeout".into()));
        }
        Ok(())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn create(&self, message: QueueMessage) -> Result<Versioned<QueueMessage>, StoreError> {
        self.check()?;
        self.inner.create(message).await
    }

    async fn get(&self, id: MessageId) -> Result<Option<Versioned<QueueMessage>>, StoreError> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn update_conditional(
        &self,
        id: MessageId,
        patch: &MessagePatch,
        expected: Version,
    ) -> Result<UpdateOutcome, StoreError> {
        self.check()?;
        self.check_write(patch)?;
        self.inner.update_conditional(id, patch, expected).await
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        self.check()?;
        self.inner.count_by_status().await
    }

    async fn find_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageId>, StoreError> {
        self.check()?;
        self.inner.find_candidates(now, limit).await
    }
}

pub struct Stores {
    pub messages: InMemoryMessageStore,
    pub dead_letters: InMemoryDeadLetterStore,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            messages: InMemoryMessageStore::new(),
            dead_letters: InMemoryDeadLetterStore::with_resource(DLQ),
        }
    }

    /// Builder with test-friendly timings: fast polls, no retry delay.
    pub fn builder(&self) -> QueueEngineBuilder {
        QueueEngine::builder(
            Arc::new(self.messages.clone()),
            Arc::new(self.dead_letters.clone()),
        )
        .poll_interval(Duration::from_millis(5))
        .backoff(FixedBackoff::immediate())
        .dead_letter_resource(DLQ)
    }

    pub async fn dead_letters_in(&self, resource: &str) -> Vec<DeadLetterRecord> {
        self.dead_letters.list(resource).await.unwrap()
    }
}

/// Poll `check` until it holds or the timeout passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met before timeout");
}

/// Wait until nothing is pending, retrying or in flight.
pub async fn wait_for_drain(engine: &QueueEngine, timeout: Duration) {
    wait_until(timeout, move || async move {
        engine
            .queue_stats()
            .await
            .map(|stats| stats.total > 0 && stats.is_drained())
            .unwrap_or(false)
    })
    .await;
}
