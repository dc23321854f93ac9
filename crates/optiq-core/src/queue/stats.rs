//! Stats aggregator: `QueueStats` from the store's status counts.

use std::sync::Arc;

use crate::domain::{QueueStats, StatusCounts};
use crate::error::StoreError;
use crate::ports::MessageStore;

/// Derives caller-facing stats from one aggregate query.
///
/// Nothing is cached or counted in-process; several engines sharing a store
/// all see the same numbers.
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn MessageStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, StoreError> {
        let counts = self.store.count_by_status().await?;
        Ok(derive_stats(counts))
    }
}

/// Split `pending` into fresh and awaiting-retry (`failed`).
pub fn derive_stats(counts: StatusCounts) -> QueueStats {
    let failed = counts.awaiting_retry.min(counts.pending);
    let pending = counts.pending - failed;
    QueueStats {
        total: pending + counts.processing + counts.completed + failed + counts.dead,
        pending,
        processing: counts.processing,
        completed: counts.completed,
        failed,
        dead: counts.dead,
    }
}
