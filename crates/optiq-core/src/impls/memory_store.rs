//! In-memory message store.
//!
//! Behaves like a document store with per-record version tags: every
//! successful write bumps a store-wide counter and stamps the record with
//! it. All operations take one short lock and never hold it across an await.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    MessageId, MessagePatch, MessageStatus, QueueMessage, StatusCounts, Version, Versioned,
};
use crate::error::StoreError;
use crate::ports::{MessageStore, UpdateOutcome};

#[derive(Debug)]
struct Entry {
    message: QueueMessage,
    version: Version,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Keyed by ULID, so iteration order is creation order.
    records: BTreeMap<MessageId, Entry>,
    last_version: u64,
}

impl MemoryState {
    fn next_version(&mut self) -> Version {
        self.last_version += 1;
        Version::new(self.last_version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, in any status.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every record, oldest first.
    pub async fn snapshot(&self) -> Vec<Versioned<QueueMessage>> {
        let state = self.state.lock().await;
        state
            .records
            .values()
            .map(|entry| Versioned::new(entry.message.clone(), entry.version))
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: QueueMessage) -> Result<Versioned<QueueMessage>, StoreError> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&message.id) {
            return Err(StoreError::AlreadyExists(message.id));
        }
        let version = state.next_version();
        state.records.insert(
            message.id,
            Entry {
                message: message.clone(),
                version,
            },
        );
        Ok(Versioned::new(message, version))
    }

    async fn get(&self, id: MessageId) -> Result<Option<Versioned<QueueMessage>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .get(&id)
            .map(|entry| Versioned::new(entry.message.clone(), entry.version)))
    }

    async fn update_conditional(
        &self,
        id: MessageId,
        patch: &MessagePatch,
        expected: Version,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some((actual, status)) = state
            .records
            .get(&id)
            .map(|entry| (entry.version, entry.message.status))
        else {
            return Ok(UpdateOutcome::NotFound);
        };
        if actual != expected {
            return Ok(UpdateOutcome::VersionConflict { expected, actual });
        }
        if status.is_terminal() {
            return Ok(UpdateOutcome::Terminal { status });
        }

        let version = state.next_version();
        if let Some(entry) = state.records.get_mut(&id) {
            entry.message.apply(patch);
            entry.version = version;
        }
        Ok(UpdateOutcome::Applied { version })
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for entry in state.records.values() {
            match entry.message.status {
                MessageStatus::Pending => {
                    counts.pending += 1;
                    if entry.message.attempts > 0 {
                        counts.awaiting_retry += 1;
                    }
                }
                MessageStatus::Processing => counts.processing += 1,
                MessageStatus::Completed => counts.completed += 1,
                MessageStatus::Dead => counts.dead += 1,
            }
        }
        Ok(counts)
    }

    async fn find_candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|entry| {
                entry.message.is_visible_at(now) || entry.message.lease_expired_at(now)
            })
            .take(limit)
            .map(|entry| entry.message.id)
            .collect())
    }
}
