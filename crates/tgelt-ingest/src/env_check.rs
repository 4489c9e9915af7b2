//! Environment report for the `check-env` subcommand

use tgelt_common::env;
use tracing::{info, warn};

/// A variable the pipeline reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownVar {
    pub name: &'static str,
    pub secret: bool,
    pub required: bool,
}

const fn var(name: &'static str, secret: bool, required: bool) -> KnownVar {
    KnownVar {
        name,
        secret,
        required,
    }
}

pub const KNOWN_VARS: &[KnownVar] = &[
    var("TELEGRAM_API_ID", false, true),
    var("TELEGRAM_API_HASH", true, true),
    var("TELEGRAM_PHONE_NUMBER", true, false),
    var("TELEGRAM_SESSION_FILE", false, false),
    var("TELEGRAM_CHANNELS", false, false),
    var("POSTGRES_HOST", false, false),
    var("POSTGRES_PORT", false, false),
    var("POSTGRES_DB", false, true),
    var("POSTGRES_USER", false, true),
    var("POSTGRES_PASSWORD", true, false),
    var("DATA_LAKE_ROOT", false, false),
    var("DBT_BIN", false, false),
    var("DBT_PROJECT_DIR", false, false),
    var("YOLO_MODEL_PATH", false, false),
];

/// Value of one variable as it may be displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarStatus {
    pub var: KnownVar,
    pub display: Option<String>,
}

impl VarStatus {
    pub fn is_missing_required(&self) -> bool {
        self.var.required && self.display.is_none()
    }
}

/// Secrets are reduced to their length; other values are shown as is.
pub fn display_value(var: &KnownVar, value: &str) -> String {
    if var.secret {
        format!("<set, {} chars>", value.chars().count())
    } else {
        value.to_string()
    }
}

pub fn check_vars(vars: &[KnownVar]) -> Vec<VarStatus> {
    vars.iter()
        .map(|var| VarStatus {
            var: *var,
            display: env::var(var.name).map(|value| display_value(var, &value)),
        })
        .collect()
}

/// Log every known variable; returns how many required ones are unset.
pub fn report() -> usize {
    let statuses = check_vars(KNOWN_VARS);
    for status in &statuses {
        match (&status.display, status.var.required) {
            (Some(value), _) => info!("{} = {}", status.var.name, value),
            (None, true) => warn!("{} is not set (required)", status.var.name),
            (None, false) => info!("{} is not set, using default", status.var.name),
        }
    }
    statuses.iter().filter(|s| s.is_missing_required()).count()
}
