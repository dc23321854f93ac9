//! Worker pool: one poll loop feeding a bounded set of handler slots.
//!
//! Slots are permits of a counting semaphore. Each tick the loop asks for at
//! most as many messages as there are free permits, so it never waits on a
//! busy slot and never claims work it cannot start right away.
//!
//! Shutdown is cooperative. `shutdown_and_join` stops the poll loop, then
//! waits until every permit is back, i.e. until in-flight handlers finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::handler::{LifecycleHooks, MessageContext, MessageHandler};
use crate::error::HandlerError;
use crate::observability::lifecycle;
use crate::queue::{ClaimEngine, ClaimedMessage, Disposition, Router};

/// First pause before repeating an outcome write the store refused.
const RECORD_RETRY_START: Duration = Duration::from_millis(10);
const RECORD_RETRY_MAX: Duration = Duration::from_secs(1);

/// Everything a slot needs to run one message to a terminal write.
struct SlotContext {
    claims: ClaimEngine,
    router: Router,
    handler: Arc<dyn MessageHandler>,
    hooks: Arc<dyn LifecycleHooks>,
    verbose: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub verbose: bool,
}

/// Handle to a running pool.
///
/// Dropping it stops new claims but does not wait for in-flight handlers.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    poll_loop: Option<JoinHandle<()>>,
    slots: Arc<Semaphore>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn spawn(
        claims: ClaimEngine,
        router: Router,
        handler: Arc<dyn MessageHandler>,
        hooks: Arc<dyn LifecycleHooks>,
        options: PoolOptions,
    ) -> Self {
        let concurrency = options.concurrency.max(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let slots = Arc::new(Semaphore::new(concurrency));
        let ctx = Arc::new(SlotContext {
            claims,
            router,
            handler,
            hooks,
            verbose: options.verbose,
        });

        tracing::info!(
            worker_id = %ctx.claims.worker_id(),
            concurrency,
            poll_interval_ms = options.poll_interval.as_millis() as u64,
            "worker pool started"
        );

        let poll_loop = tokio::spawn(poll_loop(
            ctx,
            Arc::clone(&slots),
            options.poll_interval,
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            poll_loop: Some(poll_loop),
            slots,
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Handlers currently running.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.slots.available_permits()
    }

    /// Stop claiming. In-flight handlers keep running.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop claiming and wait for in-flight handlers to finish.
    pub async fn shutdown_and_join(mut self) {
        self.request_shutdown();
        if let Some(poll_loop) = self.poll_loop.take()
            && let Err(err) = poll_loop.await
        {
            tracing::error!(error = %err, "poll loop terminated abnormally");
        }

        // every slot returns its permit when its handler and terminal write finish
        let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        match self.slots.acquire_many(all).await {
            Ok(_drained) => tracing::info!("worker pool drained"),
            Err(err) => tracing::warn!(error = %err, "slot semaphore closed during drain"),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.request_shutdown();
    }
}

async fn poll_loop(
    ctx: Arc<SlotContext>,
    slots: Arc<Semaphore>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }
        if *shutdown_rx.borrow() {
            break;
        }
        run_cycle(&ctx, &slots).await;
    }

    tracing::debug!(worker_id = %ctx.claims.worker_id(), "poll loop stopped");
}

/// One poll: claim up to the number of free slots and dispatch.
async fn run_cycle(ctx: &Arc<SlotContext>, slots: &Arc<Semaphore>) {
    let free = slots.available_permits();
    if free == 0 {
        tracing::trace!("all slots busy, skipping poll");
        return;
    }

    let batch = match ctx.claims.claim_batch(free).await {
        Ok(batch) => batch,
        Err(err) => {
            tracing::warn!(
                worker_id = %ctx.claims.worker_id(),
                error = %err,
                "poll cycle aborted, retrying next tick"
            );
            return;
        }
    };
    if batch.conflicts > 0 {
        tracing::trace!(conflicts = batch.conflicts, "lost claim races this cycle");
    }

    for exhausted in batch.exhausted {
        let id = exhausted.value.id;
        if let Err(err) = ctx.router.bury_exhausted(exhausted).await {
            tracing::warn!(message_id = %id, error = %err, "failed to dead-letter expired message");
        }
    }

    for claimed in batch.claimed {
        let Ok(permit) = Arc::clone(slots).try_acquire_owned() else {
            // The lease is left to expire; another poll will pick it up.
            tracing::warn!(message_id = %claimed.id(), "no free slot for claimed message");
            continue;
        };
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            ctx.process(claimed).await;
            drop(permit);
        });
    }
}

impl SlotContext {
    async fn process(&self, claimed: ClaimedMessage) {
        let msg_ctx = MessageContext {
            message_id: claimed.id(),
            worker_id: claimed.worker_id,
            attempts: claimed.attempts(),
            max_attempts: claimed.message.max_attempts,
        };
        lifecycle!(
            self.verbose,
            message_id = %msg_ctx.message_id,
            attempts = msg_ctx.attempts,
            "processing message"
        );

        let started = Instant::now();
        let handler = Arc::clone(&self.handler);
        let payload = claimed.message.payload.clone();
        // separate task so a panicking handler only fails this message
        let outcome = match tokio::spawn(async move { handler.handle(&payload, &msg_ctx).await })
            .await
        {
            Ok(result) => result,
            Err(err) => Err(HandlerError::new(format!("handler panicked: {err}"))),
        };
        let duration = started.elapsed();

        if let Err(error) = &outcome {
            self.hooks.on_error(&claimed.message, error);
        }
        let disposition = self.record_outcome(&claimed, &outcome, duration).await;
        match (disposition, &outcome) {
            (Some(Disposition::Completed), _) => {
                self.hooks.on_complete(&claimed.message, duration)
            }
            (None, Err(error)) => tracing::warn!(
                message_id = %claimed.id(),
                attempts = claimed.attempts(),
                error = %error,
                "handler failure not recorded before lease deadline"
            ),
            _ => {}
        }
    }

    /// Route the handler outcome, retrying through store outages.
    ///
    /// The write stays conditioned on the claim version, so repeating it is
    /// safe even if the lease was taken over meanwhile: it then comes back as
    /// `LeaseLost`. Retries stop at the lease deadline; after that the
    /// message is redelivered. `None` means nothing was recorded.
    async fn record_outcome(
        &self,
        claimed: &ClaimedMessage,
        outcome: &Result<(), HandlerError>,
        duration: Duration,
    ) -> Option<Disposition> {
        let deadline = claimed.claimed_at + self.claims.lease().visibility_timeout();
        let mut pause = RECORD_RETRY_START;
        loop {
            let written = match outcome {
                Ok(()) => self.router.complete(claimed, duration).await,
                Err(error) => self.router.fail(claimed, error).await,
            };
            let err = match written {
                Ok(disposition) => return Some(disposition),
                Err(err) => err,
            };

            let left = deadline.saturating_duration_since(Instant::now());
            if !err.is_transient() || left.is_zero() {
                tracing::warn!(
                    message_id = %claimed.id(),
                    error = %err,
                    "could not record outcome, message will be redelivered"
                );
                return None;
            }
            tracing::debug!(
                message_id = %claimed.id(),
                error = %err,
                retry_in_ms = pause.min(left).as_millis() as u64,
                "store unavailable, retrying outcome write"
            );
            tokio::time::sleep(pause.min(left)).await;
            pause = (pause * 2).min(RECORD_RETRY_MAX);
        }
    }
}
