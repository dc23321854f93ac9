//! DeadLetterStore port - terminal storage for exhausted messages.

use async_trait::async_trait;

use crate::domain::DeadLetterRecord;
use crate::error::StoreError;

/// A store of named dead-letter collections.
///
/// The engine resolves its configured collection once at build time via
/// `has_resource` and fails fast if it is missing.
///
/// # Contract
/// - `insert` is idempotent per `(original_id, attempts)`. The router may
///   repeat an insert when the store drops out between writing the record
///   and marking the message dead.
///
/// # Thread Safety
/// - `Send + Sync`; shared by every engine writing to the collection.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn has_resource(&self, resource: &str) -> Result<bool, StoreError>;

    async fn insert(&self, resource: &str, record: DeadLetterRecord) -> Result<(), StoreError>;

    async fn list(&self, resource: &str) -> Result<Vec<DeadLetterRecord>, StoreError>;
}
