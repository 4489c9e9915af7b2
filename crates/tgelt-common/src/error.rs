//! Error types shared across the pipeline crates

use thiserror::Error;

/// Result type alias for shared pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the shared configuration and IO helpers
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required environment variable is absent or empty
    #[error("Missing configuration: {0} is not set. Add it to your environment or .env file.")]
    MissingVar(String),

    /// An environment variable is present but cannot be parsed
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidVar {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn missing(name: &str) -> Self {
        Self::MissingVar(name.to_string())
    }

    pub fn invalid(name: &str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidVar {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
