//! Application layer: configuration, the builder, the engine facade and the
//! worker pool that drives handlers.

pub mod builder;
pub mod config;
pub mod engine;
pub mod handler;
pub mod worker_pool;

pub use self::builder::QueueEngineBuilder;
pub use self::config::QueueConfig;
pub use self::engine::{ProcessingOptions, QueueEngine};
pub use self::handler::{
    CallbackHooks, FnHandler, LifecycleHooks, MessageContext, MessageHandler, NoopHooks,
    handler_fn,
};
pub use self::worker_pool::{PoolOptions, WorkerPool};
