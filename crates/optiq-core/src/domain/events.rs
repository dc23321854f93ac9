//! Lifecycle events published on the notification channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MessageId;

/// A message lifecycle event.
///
/// Events are diagnostics. Nothing in the claim protocol depends on them
/// being delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum QueueEvent {
    #[serde(rename = "message.enqueued")]
    Enqueued { id: MessageId },

    #[serde(rename = "message.completed")]
    Completed {
        id: MessageId,
        attempts: u32,
        duration: Duration,
    },

    #[serde(rename = "message.retry")]
    Retry {
        id: MessageId,
        attempts: u32,
        visible_at: DateTime<Utc>,
        error: String,
    },

    #[serde(rename = "message.dead")]
    Dead {
        id: MessageId,
        attempts: u32,
        error: String,
    },
}

impl QueueEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "message.enqueued",
            QueueEvent::Completed { .. } => "message.completed",
            QueueEvent::Retry { .. } => "message.retry",
            QueueEvent::Dead { .. } => "message.dead",
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            QueueEvent::Enqueued { id }
            | QueueEvent::Completed { id, .. }
            | QueueEvent::Retry { id, .. }
            | QueueEvent::Dead { id, .. } => *id,
        }
    }

    /// Attempt count carried by the event, if any.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            QueueEvent::Enqueued { .. } => None,
            QueueEvent::Completed { attempts, .. }
            | QueueEvent::Retry { attempts, .. }
            | QueueEvent::Dead { attempts, .. } => Some(*attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn topics_match_serialized_tag() {
        let id = MessageId::from_ulid(Ulid::new());
        let event = QueueEvent::Dead {
            id,
            attempts: 3,
            error: "boom".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], event.topic());
        assert_eq!(event.message_id(), id);
        assert_eq!(event.attempts(), Some(3));
    }

    #[test]
    fn enqueued_has_no_attempts() {
        let event = QueueEvent::Enqueued {
            id: MessageId::from_ulid(Ulid::new()),
        };
        assert_eq!(event.topic(), "message.enqueued");
        assert_eq!(event.attempts(), None);
    }
}
