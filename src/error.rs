//! Error types for the intake bot.

use crate::channels::MessageId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Transport-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to delete message {message_id} on channel {name}: {reason}")]
    DeleteFailed {
        name: String,
        message_id: MessageId,
        reason: String,
    },

    #[error("Failed to poll updates on channel {name}: {reason}")]
    PollFailed { name: String, reason: String },

    #[error("Invalid response from channel {name}: {reason}")]
    InvalidResponse { name: String, reason: String },
}

/// Final delivery of a confirmed submission failed.
///
/// The conversation record is already gone when this is reported; the caller
/// only owes the user an apology.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to deliver receipt to requester: {source}")]
    Receipt {
        #[source]
        source: ChannelError,
    },

    #[error("Failed to notify operator: {source}")]
    Operator {
        /// The requester's receipt, which did go out.
        receipt: MessageId,
        #[source]
        source: ChannelError,
    },
}

impl DispatchError {
    /// Message id of the receipt if it reached the requester.
    pub fn delivered_receipt(&self) -> Option<MessageId> {
        match self {
            Self::Receipt { .. } => None,
            Self::Operator { receipt, .. } => Some(*receipt),
        }
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
