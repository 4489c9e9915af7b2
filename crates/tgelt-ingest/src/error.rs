//! Error types for the ingest stages

use std::process::ExitStatus;

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for the collector, loader, transformer and enricher
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] tgelt_common::PipelineError),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Detection error: {0}")]
    Detection(String),

    /// The data lake file does not have the expected shape
    #[error("Invalid data in {path}: {reason}")]
    InvalidData { path: String, reason: String },

    /// An external tool exited unsuccessfully
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl IngestError {
    pub fn telegram(err: impl std::fmt::Display) -> Self {
        IngestError::Telegram(err.to_string())
    }

    pub fn detection(err: impl std::fmt::Display) -> Self {
        IngestError::Detection(err.to_string())
    }
}
