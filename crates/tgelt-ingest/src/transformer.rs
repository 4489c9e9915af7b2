//! dbt transformation stage
//!
//! Shells out to the dbt CLI against the project directory. The models,
//! tests and schemas live in the dbt project, not here.

use std::ffi::OsString;
use std::path::PathBuf;
use tgelt_common::env;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{IngestError, Result};

/// dbt executable looked up on `PATH`.
pub const DEFAULT_DBT_BIN: &str = "dbt";

/// dbt subcommand; `build` runs models and their tests.
pub const DEFAULT_DBT_COMMAND: &str = "build";

/// dbt project directory, relative to the working directory.
pub const DEFAULT_DBT_PROJECT_DIR: &str = "dbt_project";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    pub dbt_bin: PathBuf,
    pub command: String,
    pub project_dir: PathBuf,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            dbt_bin: PathBuf::from(DEFAULT_DBT_BIN),
            command: DEFAULT_DBT_COMMAND.to_string(),
            project_dir: PathBuf::from(DEFAULT_DBT_PROJECT_DIR),
        }
    }
}

impl TransformConfig {
    /// Load from `DBT_BIN`, `DBT_COMMAND` and `DBT_PROJECT_DIR`.
    pub fn from_env() -> Self {
        Self {
            dbt_bin: PathBuf::from(env::string_or("DBT_BIN", DEFAULT_DBT_BIN)),
            command: env::string_or("DBT_COMMAND", DEFAULT_DBT_COMMAND),
            project_dir: PathBuf::from(env::string_or("DBT_PROJECT_DIR", DEFAULT_DBT_PROJECT_DIR)),
        }
    }

    /// Arguments passed to the dbt executable
    pub fn args(&self) -> Vec<OsString> {
        vec![
            OsString::from(&self.command),
            OsString::from("--project-dir"),
            self.project_dir.clone().into_os_string(),
        ]
    }
}

/// Run dbt and wait for it to finish.
///
/// Captured stdout is logged on success. A non-zero exit becomes
/// [`IngestError::CommandFailed`] carrying dbt's stderr.
pub async fn run_transformations(config: &TransformConfig) -> Result<()> {
    let program = config.dbt_bin.display().to_string();
    info!(
        program = %program,
        command = %config.command,
        project_dir = %config.project_dir.display(),
        "Running dbt transformations"
    );

    let output = Command::new(&config.dbt_bin)
        .args(config.args())
        .kill_on_drop(true)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(IngestError::CommandFailed {
            program,
            status: output.status,
            stderr: stderr.trim().to_string(),
        });
    }

    if !stdout.trim().is_empty() {
        info!("dbt output:\n{}", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        warn!("dbt stderr:\n{}", stderr.trim_end());
    }
    info!("dbt transformations completed successfully");
    Ok(())
}
