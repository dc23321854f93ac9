//! QueueEngineBuilder: wiring and start-up validation.
//!
//! Everything that can be checked before the first poll is checked in
//! `build()`: config bounds, the dead-letter resource, and `auto_start`
//! having a handler. A bad setup never reaches the worker pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::config::QueueConfig;
use super::engine::{ProcessingOptions, QueueEngine};
use super::handler::{CallbackHooks, LifecycleHooks, MessageHandler};
use crate::domain::{QueueMessage, WorkerId};
use crate::error::{ConfigError, HandlerError, QueueError};
use crate::ports::{Clock, DeadLetterStore, IdGenerator, MessageStore, SystemClock, UlidGenerator};
use crate::queue::{
    BackoffPolicy, ClaimEngine, ExponentialBackoff, LeaseManager, Notifier, Router,
    StatsAggregator,
};

/// Builds a [`QueueEngine`].
///
/// ```ignore
/// let engine = QueueEngine::builder(store, dead_letters)
///     .max_attempts(5)
///     .concurrency(4)
///     .on_message(handler_fn(|payload, _ctx| async move { process(payload).await }))
///     .auto_start(true)
///     .build()
///     .await?;
/// ```
pub struct QueueEngineBuilder {
    store: Arc<dyn MessageStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    backoff: Arc<dyn BackoffPolicy>,
    ids: Option<Arc<dyn IdGenerator>>,
    worker_id: Option<WorkerId>,
    handler: Option<Arc<dyn MessageHandler>>,
    callbacks: CallbackHooks,
    hooks: Option<Arc<dyn LifecycleHooks>>,
}

impl QueueEngineBuilder {
    pub fn new(store: Arc<dyn MessageStore>, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self {
            store,
            dead_letters,
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            backoff: Arc::new(ExponentialBackoff::default()),
            ids: None,
            worker_id: None,
            handler: None,
            callbacks: CallbackHooks::default(),
            hooks: None,
        }
    }

    /// Replace the whole config. Later setters still apply on top.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.config.visibility_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn dead_letter_resource(mut self, resource: impl Into<String>) -> Self {
        self.config.dead_letter_resource = resource.into();
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.config.auto_start = auto_start;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the engine clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Defaults to a fresh id per engine.
    pub fn worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn on_message(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn on_message_arc(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn on_complete(
        mut self,
        f: impl Fn(&QueueMessage, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&QueueMessage, &HandlerError) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    /// Use a hooks object instead of the `on_complete` / `on_error` closures.
    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub async fn build(self) -> Result<QueueEngine, QueueError> {
        self.config.validate()?;

        let resource = self.config.dead_letter_resource.clone();
        if !self.dead_letters.has_resource(&resource).await? {
            return Err(ConfigError::UnknownDeadLetterResource(resource).into());
        }
        if self.config.auto_start && self.handler.is_none() {
            return Err(ConfigError::AutoStartWithoutHandler.into());
        }
        if self.hooks.is_some() && !self.callbacks.is_empty() {
            tracing::warn!("both hooks and hook closures were set, closures are ignored");
        }

        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));
        let worker_id = self.worker_id.unwrap_or_else(|| ids.generate_worker_id());
        let lease = LeaseManager::new(
            Arc::clone(&self.clock),
            self.config.visibility_timeout,
            self.backoff,
        );
        let notifier = Notifier::new(self.config.event_capacity);
        let claims = ClaimEngine::new(Arc::clone(&self.store), lease.clone(), worker_id);
        let router = Router::new(
            Arc::clone(&self.store),
            Arc::clone(&self.dead_letters),
            resource,
            lease,
            Arc::clone(&ids),
            notifier.clone(),
        )
        .with_verbose(self.config.verbose);
        let hooks = self
            .hooks
            .unwrap_or_else(|| Arc::new(self.callbacks));

        let engine = QueueEngine {
            stats: StatsAggregator::new(Arc::clone(&self.store)),
            store: self.store,
            dead_letters: self.dead_letters,
            clock: self.clock,
            ids,
            claims,
            router,
            notifier,
            hooks,
            default_handler: self.handler,
            pool: Mutex::new(None),
            config: self.config,
        };
        tracing::debug!(worker_id = %engine.worker_id(), config = ?engine.config, "queue engine built");

        if engine.config.auto_start {
            engine
                .start_processing(None, ProcessingOptions::default())
                .await?;
        }
        Ok(engine)
    }
}
