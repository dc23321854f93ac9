use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use optiq_core::impls::{InMemoryDeadLetterStore, InMemoryMessageStore};
use optiq_core::queue::{ExponentialBackoff, JitteredBackoff};
use optiq_core::{
    HandlerError, MessageContext, MessageHandler, ProcessingOptions, QueueConfig, QueueEngine,
    QueueEvent, observability,
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

/// Demo settings, read from `OPTIQ_DEMO_*`.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoConfig {
    messages: usize,
    failure_rate: f64,
    work_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            messages: 10,
            failure_rate: 0.2,
            work_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Order {
    order_id: usize,
    customer: String,
}

/// Pretends to ship an order; fails at random.
struct ShipOrder {
    failure_rate: f64,
    work: Duration,
}

#[async_trait]
impl MessageHandler for ShipOrder {
    async fn handle(
        &self,
        payload: &serde_json::Value,
        ctx: &MessageContext,
    ) -> Result<(), HandlerError> {
        let order = Order::deserialize(payload)
            .map_err(|e| HandlerError::new(format!("bad payload: {e}")))?;

        tokio::time::sleep(self.work).await;
        if rand::random::<f64>() < self.failure_rate {
            return Err(HandlerError::new(format!(
                "carrier rejected order {} (attempt {}/{})",
                order.order_id, ctx.attempts, ctx.max_attempts
            )));
        }

        tracing::info!(order_id = order.order_id, customer = %order.customer, "shipped");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config: QueueConfig = envy::prefixed("OPTIQ_")
        .from_env()
        .context("reading OPTIQ_* settings")?;
    let demo: DemoConfig = envy::prefixed("OPTIQ_DEMO_")
        .from_env()
        .context("reading OPTIQ_DEMO_* settings")?;
    tracing::info!(?config, ?demo, "starting demo");

    let resource = config.dead_letter_resource.clone();
    let store = Arc::new(InMemoryMessageStore::new());
    let dead_letters = Arc::new(InMemoryDeadLetterStore::with_resource(resource));

    let engine = QueueEngine::builder(store, dead_letters)
        .config(config)
        .backoff(JitteredBackoff::new(
            ExponentialBackoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(2)),
            0.2,
        ))
        .on_message(ShipOrder {
            failure_rate: demo.failure_rate.clamp(0.0, 1.0),
            work: Duration::from_millis(demo.work_ms),
        })
        .on_error(|msg, err| {
            tracing::debug!(message_id = %msg.id, error = %err, "handler failed");
        })
        .build()
        .await
        .context("building queue engine")?;

    let mut events = engine.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(QueueEvent::Dead { id, attempts, error }) => {
                    tracing::warn!(message_id = %id, attempts, %error, "order gave up");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event watcher fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for order_id in 0..demo.messages {
        engine
            .enqueue(serde_json::json!({
                "order_id": order_id,
                "customer": format!("customer-{}", order_id % 3),
            }))
            .await?;
    }

    if !engine.config().auto_start {
        engine
            .start_processing(None, ProcessingOptions::default())
            .await?;
    }

    tokio::select! {
        drained = wait_for_drain(&engine) => drained?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, draining"),
    }
    engine.stop_processing().await;

    let stats = engine.queue_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    for record in engine.dead_letters().await? {
        println!(
            "dead: {} attempts={} error={}",
            record.original_id, record.attempts, record.last_error
        );
    }

    drop(engine);
    watcher.abort();
    Ok(())
}

async fn wait_for_drain(engine: &QueueEngine) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        ticker.tick().await;
        let stats = engine.queue_stats().await?;
        if stats.is_drained() {
            return Ok(());
        }
    }
}
