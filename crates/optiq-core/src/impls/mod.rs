//! In-process implementations of the store ports.
//!
//! Useful for tests, demos and single-process deployments. A production
//! backend implements the same traits over its own conditional-write
//! primitive (ETag, generation number, row version, ...).

pub mod memory_dead_letter;
pub mod memory_store;

pub use self::memory_dead_letter::InMemoryDeadLetterStore;
pub use self::memory_store::InMemoryMessageStore;
