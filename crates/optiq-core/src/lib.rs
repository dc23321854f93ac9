//! optiq-core
//!
//! An at-least-once message queue built on nothing but a version-conditioned
//! write. Workers claim messages by compare-and-swap, hold them under a
//! visibility timeout, and retry or dead-letter them on failure.
//!
//! # Modules
//! - **domain**: messages, versions, ids, events, dead letters, stats
//! - **ports**: `MessageStore`, `DeadLetterStore`, `Clock`, `IdGenerator`
//! - **impls**: in-memory stores
//! - **queue**: claim protocol, leases, backoff, retry routing, notifications
//! - **app**: config, `QueueEngineBuilder`, `QueueEngine`, worker pool

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{
    MessageContext, MessageHandler, ProcessingOptions, QueueConfig, QueueEngine,
    QueueEngineBuilder, handler_fn,
};
pub use domain::{
    DeadLetterRecord, MessageId, MessagePatch, MessageStatus, QueueEvent, QueueMessage,
    QueueStats, Version, Versioned,
};
pub use error::{ConfigError, HandlerError, QueueError, StoreError};
