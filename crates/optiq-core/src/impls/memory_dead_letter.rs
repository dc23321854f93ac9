//! In-memory dead-letter store with named collections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::DeadLetterRecord;
use crate::error::StoreError;
use crate::ports::DeadLetterStore;

/// Collections must be declared up front; inserting into an unknown one is
/// an error, just like writing to a resource that was never provisioned.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterStore {
    collections: Arc<Mutex<HashMap<String, Vec<DeadLetterRecord>>>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a single empty collection.
    pub fn with_resource(resource: impl Into<String>) -> Self {
        let mut collections = HashMap::new();
        collections.insert(resource.into(), Vec::new());
        Self {
            collections: Arc::new(Mutex::new(collections)),
        }
    }

    pub async fn create_resource(&self, resource: impl Into<String>) {
        let mut collections = self.collections.lock().await;
        collections.entry(resource.into()).or_default();
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn has_resource(&self, resource: &str) -> Result<bool, StoreError> {
        Ok(self.collections.lock().await.contains_key(resource))
    }

    async fn insert(&self, resource: &str, record: DeadLetterRecord) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let Some(records) = collections.get_mut(resource) else {
            return Err(StoreError::UnknownResource(resource.to_string()));
        };
        let duplicate = records
            .iter()
            .any(|r| r.original_id == record.original_id && r.attempts == record.attempts);
        if !duplicate {
            records.push(record);
        }
        Ok(())
    }

    async fn list(&self, resource: &str) -> Result<Vec<DeadLetterRecord>, StoreError> {
        let collections = self.collections.lock().await;
        collections
            .get(resource)
            .cloned()
            .ok_or_else(|| StoreError::UnknownResource(resource.to_string()))
    }
}
