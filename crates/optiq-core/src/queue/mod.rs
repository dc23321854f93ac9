//! Queue engine internals: claim protocol, leases, retry routing, stats and
//! notifications.
//!
//! Nothing in here takes an in-process lock to coordinate workers. The only
//! coordination primitive is `MessageStore::update_conditional`, which is
//! why any number of engines can share one store.

mod claim;
mod lease;
mod notify;
mod retry;
mod router;
mod stats;

pub use claim::{ClaimBatch, ClaimEngine, ClaimResult, ClaimedMessage};
pub use lease::LeaseManager;
pub use notify::Notifier;
pub use retry::{BackoffPolicy, ExponentialBackoff, FixedBackoff, JitteredBackoff};
pub use router::{Disposition, Router};
pub use stats::{StatsAggregator, derive_stats};
