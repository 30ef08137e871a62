//! hivebus: file-backed topic notifications for cooperating local processes
//!
//! This crate provides the coordination substrate shared by the terminal
//! application and the agent processes it supervises:
//! - Topic files: one small JSON document per topic in a shared directory
//! - A topic watcher that turns file changes into debounced, per-subscriber
//!   notifications (exact or prefix patterns)
//! - A durable, bounded, newest-first history store with atomic saves
//!
//! Notifications never carry payloads. A subscriber treats each
//! [`TopicEvent`] as an invalidation signal and re-reads the topic file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

pub mod config;
pub mod debounce;
pub mod fsutil;
pub mod history;
pub mod pattern;
pub mod registry;
pub mod topic;
pub mod watch;

// Re-export main types
pub use config::Config;
pub use history::{HistoryStore, Record};
pub use pattern::{matches, TopicPattern};
pub use registry::Subscription;
pub use topic::TopicDir;
pub use watch::{TopicWatcher, WatcherOptions};

/// A change notification for one topic.
///
/// Synthesized once per debounce window per topic. The payload is never
/// included; re-read the topic file to observe the new state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicEvent {
    /// Logical topic name, e.g. `agents/test` or `hive.session.created`
    pub topic: String,
    /// When the notification was dispatched
    pub timestamp: DateTime<Utc>,
}

impl TopicEvent {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Errors surfaced by the topic and history layers.
///
/// Lookups that find nothing return `Ok(None)` rather than an error, and
/// runtime listener failures are logged and absorbed by the watcher.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to attach file watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("Corrupt JSON document at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Topic watcher is closed")]
    Closed,
}

impl BusError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_event_serializes_timestamp_as_rfc3339() {
        let event = TopicEvent::new("hive.session.created");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "hive.session.created");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_error_messages_include_path() {
        let err = BusError::io(
            "creating topic directory",
            "/tmp/topics",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("creating topic directory"));
        assert!(msg.contains("/tmp/topics"));
    }
}
