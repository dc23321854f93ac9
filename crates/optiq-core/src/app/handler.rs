//! Handler interface for user processing logic.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{MessageId, QueueMessage, WorkerId};
use crate::error::HandlerError;

/// What a handler knows about the delivery it is processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub message_id: MessageId,
    pub worker_id: WorkerId,
    /// 1 on first delivery.
    pub attempts: u32,
    pub max_attempts: u32,
}

impl MessageContext {
    pub fn is_final_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Processes one message.
///
/// Delivery is at-least-once. A handler that outlives the visibility timeout
/// can run concurrently with a second delivery of the same message, so
/// implementations must be idempotent.
///
/// # Outcomes
/// - `Ok(())` completes the message
/// - `Err` schedules a retry, or dead-letters on the final attempt
/// - a panic is caught in the slot and counts as `Err`
///
/// # Thread Safety
/// - requires `Send + Sync`; one handler serves every slot of the pool
///
/// For closures, see [`handler_fn`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        payload: &serde_json::Value,
        ctx: &MessageContext,
    ) -> Result<(), HandlerError>;
}

/// Adapter so an async closure can be used as a handler.
pub struct FnHandler<F>(F);

/// Wrap `f(payload, ctx)` as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(serde_json::Value, MessageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(serde_json::Value, MessageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(
        &self,
        payload: &serde_json::Value,
        ctx: &MessageContext,
    ) -> Result<(), HandlerError> {
        (self.0)(payload.clone(), ctx.clone()).await
    }
}

/// Observers of handler outcomes (`on_complete` / `on_error`).
///
/// `on_error` runs as soon as the handler fails, before the failure is
/// written. `on_complete` runs only once the completion is stored, so a
/// completion that lost its lease is not reported. Both default to doing
/// nothing.
pub trait LifecycleHooks: Send + Sync {
    fn on_complete(&self, _message: &QueueMessage, _duration: Duration) {}

    fn on_error(&self, _message: &QueueMessage, _error: &HandlerError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

type CompleteFn = Box<dyn Fn(&QueueMessage, Duration) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&QueueMessage, &HandlerError) + Send + Sync>;

/// Hooks assembled from closures by the builder.
#[derive(Default)]
pub struct CallbackHooks {
    pub(crate) on_complete: Option<CompleteFn>,
    pub(crate) on_error: Option<ErrorFn>,
}

impl CallbackHooks {
    pub fn is_empty(&self) -> bool {
        self.on_complete.is_none() && self.on_error.is_none()
    }
}

impl LifecycleHooks for CallbackHooks {
    fn on_complete(&self, message: &QueueMessage, duration: Duration) {
        if let Some(f) = &self.on_complete {
            f(message, duration);
        }
    }

    fn on_error(&self, message: &QueueMessage, error: &HandlerError) {
        if let Some(f) = &self.on_error {
            f(message, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

    fn ctx(attempts: u32) -> MessageContext {
        let ids = UlidGenerator::new(SystemClock);
        MessageContext {
            message_id: ids.generate_message_id(),
            worker_id: ids.generate_worker_id(),
            attempts,
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn closures_work_as_handlers() {
        let handler = handler_fn(|payload, ctx: MessageContext| async move {
            if payload["fail"] == true {
                Err(HandlerError::new(format!("attempt {}", ctx.attempts)))
            } else {
                Ok(())
            }
        });

        assert!(handler.handle(&serde_json::json!({}), &ctx(1)).await.is_ok());
        let err = handler
            .handle(&serde_json::json!({"fail": true}), &ctx(2))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "attempt 2");
    }

    #[test]
    fn final_attempt_flag() {
        assert!(!ctx(2).is_final_attempt());
        assert!(ctx(3).is_final_attempt());
    }
}
