use thiserror::Error;

/// Errors raised while loading engine settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed settings file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("Maximum nesting depth must be greater than zero")]
    ZeroDepth,
}
