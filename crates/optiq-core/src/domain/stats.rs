//! Per-status counts.

use serde::{Deserialize, Serialize};

/// Raw counts as returned by the store's aggregate query.
///
/// `awaiting_retry` is the subset of `pending` whose `attempts > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub dead: usize,
    pub awaiting_retry: usize,
}

/// Caller-facing queue statistics.
///
/// `pending` counts never-attempted messages and `failed` counts messages
/// waiting out a retry backoff, so the two never overlap and
/// `total == pending + processing + completed + failed + dead`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
}

impl QueueStats {
    /// Nothing pending, waiting for retry or in flight.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.failed == 0 && self.processing == 0
    }
}
