//! Notification channel: best-effort, in-process lifecycle events.

use tokio::sync::broadcast;

use crate::domain::QueueEvent;

/// Fan-out of [`QueueEvent`]s to any number of subscribers.
///
/// Publishing never blocks and never fails. With no subscribers the event is
/// dropped; a subscriber that falls more than `capacity` events behind sees
/// `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<QueueEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: QueueEvent) {
        tracing::trace!(topic = event.topic(), message_id = %event.message_id(), "publish");
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
