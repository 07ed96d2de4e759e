//! Error types for the gateway.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Delivery channel errors (email / HTTP API).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} send failed: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP request failed with status {code}: {reason}")]
    HttpStatus { code: u16, reason: String },

    #[error("Request timed out on channel {name}")]
    Timeout { name: String },

    #[error("Channel {name} is not configured: {reason}")]
    NotConfigured { name: String, reason: String },

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

/// Ingestion pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source fetch failed: {0}")]
    SourceFetch(String),
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
