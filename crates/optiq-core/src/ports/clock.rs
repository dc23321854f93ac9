//! Clock port.
//!
//! Lease expiry and backoff scheduling read time through this trait so that
//! tests can move time by hand instead of sleeping.
//!
//! # Implementations
//! - **SystemClock**: wall-clock time
//! - **FixedClock**: set or advanced by hand, for tests

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time for lease and retry decisions.
///
/// Times written into records (`visible_at`, `completed_at`, `dead_at`) all
/// come from here. Several engines sharing a store should read clocks that
/// agree to well within the visibility timeout, or a lease may look expired
/// to one instance while the holder still considers it live.
///
/// In-process waits (poll ticks, write retries) use tokio's monotonic timer
/// instead and are not affected by this clock.
///
/// # Thread Safety
/// - requires `Send + Sync`; the engine shares one clock through `Arc`
///
/// # Example
///
/// ```ignore
/// let clock = Arc::new(FixedClock::new(start));
/// let engine = QueueEngine::builder(store, dead_letters)
///     .clock(clock.clone())
///     .build()
///     .await?;
/// clock.advance(Duration::from_secs(30));
/// ```
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock with millisecond resolution.
///
/// Shared through `Arc`; `set` and `advance` are visible to every holder.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
