//! Companion record written when a message exhausts its retry budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeadLetterId, MessageId, QueueMessage};

/// What survives of a message in the dead-letter store.
///
/// `(original_id, attempts)` identifies the dead-lettering; stores use it
/// to drop repeated inserts of the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: DeadLetterId,
    pub original_id: MessageId,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: String,
    pub dead_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn from_message(
        id: DeadLetterId,
        message: &QueueMessage,
        last_error: String,
        dead_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            original_id: message.id,
            payload: message.payload.clone(),
            attempts: message.attempts,
            last_error,
            dead_at,
        }
    }
}
