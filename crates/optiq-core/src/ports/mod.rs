//! Ports: the seams between the queue engine and the outside world.
//!
//! The engine owns no storage. Every record lives behind `MessageStore` /
//! `DeadLetterStore`, and all coordination between workers happens through
//! `MessageStore::update_conditional`.

pub mod clock;
pub mod dead_letter_store;
pub mod id_generator;
pub mod message_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dead_letter_store::DeadLetterStore;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::message_store::{MessageStore, UpdateOutcome};
