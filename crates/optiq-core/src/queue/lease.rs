//! Lease manager: visibility-timeout arithmetic.
//!
//! Pure functions of the clock and message state. It never writes; an expired
//! lease is simply claimable again and the claim engine takes it from there.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::BackoffPolicy;
use crate::domain::QueueMessage;
use crate::ports::Clock;

#[derive(Clone)]
pub struct LeaseManager {
    clock: Arc<dyn Clock>,
    visibility_timeout: Duration,
    backoff: Arc<dyn BackoffPolicy>,
}

impl LeaseManager {
    pub fn new(
        clock: Arc<dyn Clock>,
        visibility_timeout: Duration,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> Self {
        Self {
            clock,
            visibility_timeout,
            backoff,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    /// Processing, and the holder's lease has run out.
    pub fn is_reclaimable(&self, message: &QueueMessage) -> bool {
        message.lease_expired_at(self.now())
    }

    /// Pending-and-visible, or reclaimable.
    pub fn is_claimable(&self, message: &QueueMessage) -> bool {
        let now = self.now();
        message.is_visible_at(now) || message.lease_expired_at(now)
    }

    /// `visible_at` for a lease taken now.
    pub fn lease_deadline(&self) -> DateTime<Utc> {
        offset(self.now(), self.visibility_timeout)
    }

    /// `visible_at` for a retry after `attempts` attempts.
    pub fn retry_at(&self, attempts: u32) -> DateTime<Utc> {
        offset(self.now(), self.backoff.delay(attempts))
    }
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("visibility_timeout", &self.visibility_timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}

fn offset(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessagePatch, WorkerId};
    use crate::ports::FixedClock;
    use crate::queue::{ExponentialBackoff, FixedBackoff};
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn manager(clock: Arc<FixedClock>) -> LeaseManager {
        LeaseManager::new(
            clock,
            Duration::from_millis(1000),
            Arc::new(FixedBackoff::new(Duration::from_millis(500))),
        )
    }

    fn leased_message(lm: &LeaseManager) -> QueueMessage {
        let mut msg = QueueMessage::new(
            MessageId::from_ulid(Ulid::new()),
            serde_json::json!(null),
            3,
            lm.now(),
        );
        msg.apply(&MessagePatch::claim(
            WorkerId::from_ulid(Ulid::new()),
            1,
            lm.lease_deadline(),
        ));
        msg
    }

    #[rstest]
    #[case(0, false)]
    #[case(999, false)]
    #[case(1000, true)]
    #[case(1500, true)]
    fn lease_expires_exactly_at_deadline(#[case] elapsed_ms: u64, #[case] reclaimable: bool) {
        let clock = Arc::new(FixedClock::new(start()));
        let lm = manager(Arc::clone(&clock));
        let msg = leased_message(&lm);

        clock.advance(Duration::from_millis(elapsed_ms));
        assert_eq!(lm.is_reclaimable(&msg), reclaimable);
        assert_eq!(lm.is_claimable(&msg), reclaimable);
    }

    #[test]
    fn pending_messages_are_not_reclaimable_but_claimable() {
        let clock = Arc::new(FixedClock::new(start()));
        let lm = manager(clock);
        let msg = QueueMessage::new(
            MessageId::from_ulid(Ulid::new()),
            serde_json::json!(null),
            3,
            lm.now(),
        );
        assert!(!lm.is_reclaimable(&msg));
        assert!(lm.is_claimable(&msg));
    }

    #[test]
    fn retry_at_uses_backoff() {
        let clock = Arc::new(FixedClock::new(start()));
        let lm = LeaseManager::new(
            clock,
            Duration::from_secs(30),
            Arc::new(ExponentialBackoff::default()),
        );
        assert_eq!(lm.retry_at(1), start() + chrono::Duration::seconds(1));
        assert_eq!(lm.retry_at(3), start() + chrono::Duration::seconds(4));
        assert_eq!(lm.lease_deadline(), start() + chrono::Duration::seconds(30));
    }

    #[test]
    fn huge_offsets_saturate() {
        assert_eq!(offset(start(), Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
