//! Error types for aicon.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Conversation flow faults.
///
/// None of these reach the caller: the turn handler turns them into a
/// reset, a re-prompt, or a generic fallback reply.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Step {step} not found in flow {flow}")]
    InvalidStepReference { flow: String, step: String },

    #[error("Flow {0} is not defined")]
    UnknownFlow(String),

    #[error("State store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
