//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Every recognised engine option with its default.
///
/// Handlers and hooks (`on_message`, `on_error`, `on_complete`) are code,
/// not data, so they are supplied to `QueueEngineBuilder` instead.
/// Durations are (de)serialized as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a claimed message stays hidden. Must exceed the expected
    /// handler runtime; a handler still running when it elapses may see its
    /// message processed concurrently by another worker.
    #[serde(with = "duration_ms", rename = "visibility_timeout_ms")]
    pub visibility_timeout: Duration,

    #[serde(with = "duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,

    pub max_attempts: u32,

    pub concurrency: usize,

    pub dead_letter_resource: String,

    pub auto_start: bool,

    /// Log per-message lifecycle at `info` instead of `debug`.
    pub verbose: bool,

    /// Buffer size of the notification channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            max_attempts: 3,
            concurrency: 1,
            dead_letter_resource: "dead_letters".to_string(),
            auto_start: false,
            verbose: false,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.visibility_timeout.is_zero() {
            return Err(ConfigError::MustBePositive("visibility_timeout"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::MustBePositive("poll_interval"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::MustBePositive("max_attempts"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::MustBePositive("concurrency"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::MustBePositive("event_capacity"));
        }
        if self.dead_letter_resource.trim().is_empty() {
            return Err(ConfigError::EmptyDeadLetterResource);
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(QueueConfig::default().validate(), Ok(()));
    }

    #[rstest]
    #[case::visibility(QueueConfig { visibility_timeout: Duration::ZERO, ..Default::default() }, ConfigError::MustBePositive("visibility_timeout"))]
    #[case::poll(QueueConfig { poll_interval: Duration::ZERO, ..Default::default() }, ConfigError::MustBePositive("poll_interval"))]
    #[case::attempts(QueueConfig { max_attempts: 0, ..Default::default() }, ConfigError::MustBePositive("max_attempts"))]
    #[case::concurrency(QueueConfig { concurrency: 0, ..Default::default() }, ConfigError::MustBePositive("concurrency"))]
    #[case::events(QueueConfig { event_capacity: 0, ..Default::default() }, ConfigError::MustBePositive("event_capacity"))]
    #[case::dlq(QueueConfig { dead_letter_resource: "  ".into(), ..Default::default() }, ConfigError::EmptyDeadLetterResource)]
    fn invalid_configs_are_rejected(#[case] config: QueueConfig, #[case] expected: ConfigError) {
        assert_eq!(config.validate(), Err(expected));
    }

    #[test]
    fn durations_read_as_milliseconds() {
        let config: QueueConfig = serde_json::from_value(serde_json::json!({
            "visibility_timeout_ms": 1000,
            "poll_interval_ms": 50,
            "max_attempts": 5,
        }))
        .unwrap();

        assert_eq!(config.visibility_timeout, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.dead_letter_resource, "dead_letters");
    }

    #[test]
    fn serializes_back_to_milliseconds() {
        let json = serde_json::to_value(QueueConfig::default()).unwrap();
        assert_eq!(json["visibility_timeout_ms"], 30_000);
        assert_eq!(json["poll_interval_ms"], 1_000);
    }
}
