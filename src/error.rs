//! Error types for formbot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Tabular sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink request failed: {0}")]
    Request(String),

    #[error("Sink returned {status} for {operation}: {body}")]
    Api {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid sink response for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },
}

/// Conversation engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown form in active session: {form_id}")]
    UnknownForm { form_id: String },

    #[error("Store error during turn: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
