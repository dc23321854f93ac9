//! Strongly-typed identifiers.
//!
//! All ids are ULIDs wrapped in a phantom-typed `Id<T>`, so a `MessageId`
//! cannot be passed where a `WorkerId` is expected. ULIDs sort by creation
//! time, which the in-memory store uses to hand out older candidates first.
//! That ordering is best effort only; the queue never promises FIFO.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait supplying the display prefix for each id kind.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic id type. `T` is a zero-sized marker and costs nothing at runtime.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Message {}

impl IdMarker for Message {
    fn prefix() -> &'static str {
        "msg-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeadLetter {}

impl IdMarker for DeadLetter {
    fn prefix() -> &'static str {
        "dlq-"
    }
}

/// Identifier of a queued message. Immutable for the message's lifetime.
pub type MessageId = Id<Message>;

/// Identifier of a queue engine instance holding leases.
pub type WorkerId = Id<Worker>;

/// Identifier of a companion record in the dead-letter store.
pub type DeadLetterId = Id<DeadLetter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        let ulid = Ulid::new();
        assert_eq!(MessageId::from_ulid(ulid).to_string(), format!("msg-{ulid}"));
        assert!(WorkerId::from_ulid(ulid).to_string().starts_with("worker-"));
        assert!(DeadLetterId::from_ulid(ulid).to_string().starts_with("dlq-"));
    }

    #[test]
    fn message_ids_sort_by_creation_time() {
        let first = MessageId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MessageId::from_ulid(Ulid::new());
        assert!(first < second);
    }

    #[test]
    fn ids_survive_serialization() {
        let id = MessageId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn phantom_marker_is_free() {
        assert_eq!(std::mem::size_of::<MessageId>(), std::mem::size_of::<Ulid>());
    }
}
