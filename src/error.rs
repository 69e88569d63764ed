//! Error types for the activity engine.

use crate::types::{ActivityId, NotificationId, StreamId};
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity kind not tracked: {0}")]
    KindNotTracked(String),

    #[error("Entity of kind {kind} has no persisted identity")]
    NotPersisted { kind: String },

    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    #[error("Activity not found: {0}")]
    ActivityNotFound(ActivityId),

    #[error("Notification not found: {0}")]
    NotificationNotFound(NotificationId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            EngineError::Deserialization(e.to_string())
        } else {
            EngineError::Serialization(e.to_string())
        }
    }
}

/// Failure reported by a mailer collaborator.
///
/// Never fatal to an event path: the engine logs it and records it on the
/// notification's delivery status.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MailError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Recipient {address} rejected: {reason}")]
    Rejected { address: String, reason: String },

    #[error("Mail delivery timed out")]
    Timeout,

    #[error("Mail outbox is full")]
    QueueFull,

    #[error("Subscriber has no email address")]
    NoAddress,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
