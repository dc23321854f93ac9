//! Domain model: messages, versions, ids, events, dead letters, stats.

pub mod dead_letter;
pub mod events;
pub mod ids;
pub mod message;
pub mod stats;
pub mod version;

pub use dead_letter::DeadLetterRecord;
pub use events::QueueEvent;
pub use ids::{DeadLetterId, Id, IdMarker, MessageId, WorkerId};
pub use message::{MessagePatch, MessageStatus, QueueMessage};
pub use stats::{QueueStats, StatusCounts};
pub use version::{Version, Versioned};
