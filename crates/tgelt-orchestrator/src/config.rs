//! Orchestrator configuration
//!
//! Loaded from environment variables:
//! - `TGELT_INGEST_BIN`: stage runner executable (default: `tgelt-ingest`
//!   next to the running binary, else looked up on `PATH`)
//! - `PIPELINE_SCHEDULE`: cron expression, UTC (default: `0 0 * * *`)

use apalis_cron::Schedule;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tgelt_common::env;

use crate::error::{OrchestratorError, Result};

/// Name of the stage runner binary.
pub const INGEST_BIN_NAME: &str = "tgelt-ingest";

/// Daily at midnight UTC.
pub const DEFAULT_SCHEDULE: &str = "0 0 * * *";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Executable every op runs
    pub ingest_bin: PathBuf,
    /// Cron expression in six- or seven-field form
    pub schedule: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ingest_bin: default_ingest_bin(),
            schedule: format!("0 {DEFAULT_SCHEDULE}"),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        let ingest_bin = env::var("TGELT_INGEST_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(default_ingest_bin);
        let schedule = normalize_cron(&env::string_or("PIPELINE_SCHEDULE", DEFAULT_SCHEDULE))?;

        Ok(Self {
            ingest_bin,
            schedule,
        })
    }
}

/// `tgelt-ingest` beside the current executable when present; otherwise
/// the bare name, resolved through `PATH` at spawn time.
pub fn default_ingest_bin() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| sibling_binary(dir, INGEST_BIN_NAME)))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(INGEST_BIN_NAME))
}

fn sibling_binary(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

/// Accept classic five-field cron and return the seconds-first form the
/// scheduler parses.
///
/// Six- and seven-field expressions pass through unchanged. The result is
/// checked by parsing it.
pub fn normalize_cron(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => {
            return Err(OrchestratorError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("expected 5, 6 or 7 fields, found {n}"),
            })
        },
    };

    parse_schedule(&normalized)?;
    Ok(normalized)
}

pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression).map_err(|e| OrchestratorError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_normalize_five_fields() {
        assert_eq!(normalize_cron("0 0 * * *").unwrap(), "0 0 0 * * *");
        assert_eq!(normalize_cron("  30 6   * * 1-5 ").unwrap(), "0 30 6 * * 1-5");
    }

    #[test]
    fn test_normalize_passes_seconds_form() {
        assert_eq!(normalize_cron("15 0 0 * * *").unwrap(), "15 0 0 * * *");
        assert_eq!(normalize_cron("0 0 0 1 1 * 2030").unwrap(), "0 0 0 1 1 * 2030");
    }

    #[test]
    fn test_normalize_rejects_bad_expressions() {
        assert!(matches!(
            normalize_cron("0 0 *"),
            Err(OrchestratorError::InvalidSchedule { .. })
        ));
        assert!(normalize_cron("61 0 * * *").is_err());
        assert!(normalize_cron("").is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("TGELT_INGEST_BIN", "/opt/tgelt/bin/tgelt-ingest");
        std::env::set_var("PIPELINE_SCHEDULE", "0 3 * * *");

        let config = OrchestratorConfig::from_env().unwrap();
        assert_eq!(config.ingest_bin, PathBuf::from("/opt/tgelt/bin/tgelt-ingest"));
        assert_eq!(config.schedule, "0 0 3 * * *");

        std::env::set_var("PIPELINE_SCHEDULE", "every day");
        assert!(OrchestratorConfig::from_env().is_err());

        std::env::remove_var("TGELT_INGEST_BIN");
        std::env::remove_var("PIPELINE_SCHEDULE");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        std::env::remove_var("TGELT_INGEST_BIN");
        std::env::remove_var("PIPELINE_SCHEDULE");

        let config = OrchestratorConfig::from_env().unwrap();
        assert_eq!(config.schedule, "0 0 0 * * *");
        assert!(config.ingest_bin.ends_with(sibling_binary(Path::new(""), INGEST_BIN_NAME)));
    }
}
