use thiserror::Error;

/// Main error type for the failover core
#[derive(Error, Debug)]
pub enum KeelError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Caller errors
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    // Component health errors
    #[error("Component failure: {component} - {reason}")]
    ComponentFailure { component: String, reason: String },

    // Emergency shutdown errors
    #[error("Trading engine shutdown failed: {0}")]
    EngineShutdown(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for KeelError
pub type Result<T> = std::result::Result<T, KeelError>;
