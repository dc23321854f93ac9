//! QueueEngine: the public surface of one engine instance.
//!
//! Several engines may share the same stores. Each has its own worker id and
//! worker pool; they coordinate only through conditional writes.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};

use super::builder::QueueEngineBuilder;
use super::config::QueueConfig;
use super::handler::{LifecycleHooks, MessageHandler};
use super::worker_pool::{PoolOptions, WorkerPool};
use crate::domain::{
    DeadLetterRecord, MessageId, MessagePatch, QueueEvent, QueueMessage, QueueStats, Version,
    Versioned, WorkerId,
};
use crate::error::{ConfigError, QueueError};
use crate::observability::lifecycle;
use crate::ports::{Clock, DeadLetterStore, IdGenerator, MessageStore, UpdateOutcome};
use crate::queue::{ClaimEngine, Notifier, Router, StatsAggregator};

/// Per-call overrides for [`QueueEngine::start_processing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingOptions {
    /// Overrides `QueueConfig::concurrency` for this run.
    pub concurrency: Option<usize>,
}

impl ProcessingOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: Some(concurrency),
        }
    }
}

pub struct QueueEngine {
    pub(crate) config: QueueConfig,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) dead_letters: Arc<dyn DeadLetterStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) claims: ClaimEngine,
    pub(crate) router: Router,
    pub(crate) stats: StatsAggregator,
    pub(crate) notifier: Notifier,
    pub(crate) hooks: Arc<dyn LifecycleHooks>,
    pub(crate) default_handler: Option<Arc<dyn MessageHandler>>,
    pub(crate) pool: Mutex<Option<WorkerPool>>,
}

impl QueueEngine {
    pub fn builder(
        store: Arc<dyn MessageStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> QueueEngineBuilder {
        QueueEngineBuilder::new(store, dead_letters)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn worker_id(&self) -> WorkerId {
        self.claims.worker_id()
    }

    /// The claim engine this instance polls with. Exposed for callers that
    /// drive claims by hand instead of running a worker pool.
    pub fn claim_engine(&self) -> &ClaimEngine {
        &self.claims
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Add a message to the backlog. It is visible to workers immediately.
    pub async fn enqueue(&self, payload: serde_json::Value) -> Result<QueueMessage, QueueError> {
        let message = QueueMessage::new(
            self.ids.generate_message_id(),
            payload,
            self.config.max_attempts,
            self.clock.now(),
        );
        let created = self.store.create(message).await?;
        lifecycle!(
            self.config.verbose,
            message_id = %created.value.id,
            version = %created.version,
            "message enqueued"
        );
        self.notifier.publish(QueueEvent::Enqueued {
            id: created.value.id,
        });
        Ok(created.value)
    }

    pub async fn get(&self, id: MessageId) -> Result<Versioned<QueueMessage>, QueueError> {
        self.store
            .get(id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    /// Optimistic update: applies `patch` only if the record is still at
    /// `expected`. A conflict is reported in the outcome, not as an error.
    ///
    /// Completed and dead messages are never rewritten; they come back as
    /// `UpdateOutcome::Terminal` whatever the store does. A record that turns
    /// terminal after the check changes version, so the write conflicts.
    pub async fn update_conditional(
        &self,
        id: MessageId,
        patch: &MessagePatch,
        expected: Version,
    ) -> Result<UpdateOutcome, QueueError> {
        let Some(current) = self.store.get(id).await? else {
            return Ok(UpdateOutcome::NotFound);
        };
        if current.version == expected && current.value.status.is_terminal() {
            return Ok(UpdateOutcome::Terminal {
                status: current.value.status,
            });
        }
        Ok(self.store.update_conditional(id, patch, expected).await?)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.stats.queue_stats().await?)
    }

    /// Records in the configured dead-letter resource.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterRecord>, QueueError> {
        Ok(self
            .dead_letters
            .list(self.router.dead_letter_resource())
            .await?)
    }

    /// Subscribe to lifecycle notifications. Only events published after
    /// this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.notifier.subscribe()
    }

    /// Start the worker pool.
    ///
    /// `handler` falls back to the one given to the builder. If a pool is
    /// already running it is drained first, so the new settings take effect
    /// without two pools overlapping.
    pub async fn start_processing(
        &self,
        handler: Option<Arc<dyn MessageHandler>>,
        options: ProcessingOptions,
    ) -> Result<(), QueueError> {
        let handler = handler
            .or_else(|| self.default_handler.clone())
            .ok_or(ConfigError::MissingHandler)?;
        let concurrency = options.concurrency.unwrap_or(self.config.concurrency);
        if concurrency == 0 {
            return Err(ConfigError::MustBePositive("concurrency").into());
        }

        let mut pool = self.pool.lock().await;
        if let Some(previous) = pool.take() {
            tracing::info!(worker_id = %self.worker_id(), "restarting worker pool");
            previous.shutdown_and_join().await;
        }
        *pool = Some(WorkerPool::spawn(
            self.claims.clone(),
            self.router.clone(),
            handler,
            Arc::clone(&self.hooks),
            PoolOptions {
                concurrency,
                poll_interval: self.config.poll_interval,
                verbose: self.config.verbose,
            },
        ));
        Ok(())
    }

    /// Stop claiming and wait for in-flight handlers to reach a terminal
    /// write. No-op when not processing.
    pub async fn stop_processing(&self) {
        let previous = self.pool.lock().await.take();
        if let Some(pool) = previous {
            pool.shutdown_and_join().await;
            tracing::info!(worker_id = %self.worker_id(), "processing stopped");
        }
    }

    pub async fn is_processing(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Handlers currently running in this instance.
    pub async fn in_flight(&self) -> usize {
        self.pool
            .lock()
            .await
            .as_ref()
            .map_or(0, WorkerPool::in_flight)
    }
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("worker_id", &self.worker_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
