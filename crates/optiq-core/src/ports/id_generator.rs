//! IdGenerator port.
//!
//! ULIDs can be minted on any node without coordination, which is what lets
//! several engine instances enqueue into the same store.
//!
//! # Implementations
//! - **UlidGenerator**: ULID from a [`Clock`] timestamp plus 80 random bits

use crate::domain::{DeadLetterId, MessageId, WorkerId};
use crate::ports::Clock;
use ulid::Ulid;

/// Mints identifiers for messages, engine instances and dead-letter records.
///
/// # ULID properties
/// - sortable by creation time (millisecond prefix)
/// - no coordination between generators
/// - 128 bits, rendered with a kind prefix such as `msg-`
///
/// Ordering is only by millisecond. Two ids minted in the same millisecond
/// compare by their random part, so the queue never relies on id order for
/// delivery.
///
/// # Thread Safety
/// - requires `Send + Sync`; one generator is shared by every slot of a pool
pub trait IdGenerator: Send + Sync {
    /// Id for a newly enqueued message.
    fn generate_message_id(&self) -> MessageId;

    /// Id for one engine instance; written into `claimed_by` on every lease.
    fn generate_worker_id(&self) -> WorkerId;

    fn generate_dead_letter_id(&self) -> DeadLetterId;
}

/// ULID generator whose timestamp part comes from a [`Clock`].
///
/// With a [`FixedClock`](crate::ports::FixedClock) every id shares one
/// timestamp, which keeps time-dependent tests deterministic.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        MessageId::from(self.next_ulid())
    }

    fn generate_worker_id(&self) -> WorkerId {
        WorkerId::from(self.next_ulid())
    }

    fn generate_dead_letter_id(&self) -> DeadLetterId {
        DeadLetterId::from(self.next_ulid())
    }
}
