use thiserror::Error;

use crate::domain::MessageId;

/// Failures of the backing store.
///
/// Version conflicts are not errors; they come back as
/// `UpdateOutcome::VersionConflict`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Transient infrastructure failure. The current poll cycle is abandoned
    /// and retried on the next tick; it never counts against `max_attempts`.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("message already exists: {0}")]
    AlreadyExists(MessageId),

    #[error("unknown resource: {0}")]
    UnknownResource(String),
}

impl StoreError {
    /// Worth retrying the same call later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Invalid engine setup. Raised before any processing starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("dead_letter_resource must not be empty")]
    EmptyDeadLetterResource,

    #[error("dead-letter resource '{0}' does not exist in the dead-letter store")]
    UnknownDeadLetterResource(String),

    #[error("auto_start requires a message handler")]
    AutoStartWithoutHandler,

    #[error("a message handler is required to start processing")]
    MissingHandler,
}

/// Failure reported by user processing logic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("message not found: {0}")]
    NotFound(MessageId),
}

impl QueueError {
    /// True for failures worth retrying on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Store(err) if err.is_transient())
    }
}
