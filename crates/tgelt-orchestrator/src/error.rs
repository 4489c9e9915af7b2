//! Error types for the orchestrator

use std::process::ExitStatus;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// An op's process exited unsuccessfully
    #[error("{op} failed ({status}): {stderr}")]
    OpFailed {
        op: String,
        status: ExitStatus,
        stderr: String,
    },

    /// An op's process could not be started
    #[error("{op} could not be started ({program}): {source}")]
    Spawn {
        op: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job {job}: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Config(#[from] tgelt_common::PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn invalid_job(job: &str, reason: impl Into<String>) -> Self {
        OrchestratorError::InvalidJob {
            job: job.to_string(),
            reason: reason.into(),
        }
    }
}
