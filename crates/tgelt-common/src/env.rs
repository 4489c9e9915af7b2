//! Environment configuration helpers
//!
//! Every stage reads its configuration from process environment variables,
//! optionally seeded from a `.env` file in the working directory. These
//! helpers keep the lookup/parse/default dance in one place.

use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Load `.env` into the process environment, if one exists.
///
/// Variables already present in the environment win over the file.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {},
        Err(e) => tracing::warn!(error = %e, "Failed to parse .env file"),
    }
}

/// Read a variable, treating empty values as unset.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a variable that must be present.
pub fn required(name: &str) -> Result<String> {
    var(name).ok_or_else(|| PipelineError::missing(name))
}

/// Read a variable or fall back to `default`.
pub fn string_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

/// Parse a variable or fall back to `default` when unset.
///
/// A value that is set but unparsable is an error rather than a silent
/// fallback.
pub fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| PipelineError::invalid(name, &raw, e)),
        None => Ok(default),
    }
}

/// Parse a variable that must be present.
pub fn parse_required<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(name)?;
    raw.parse()
        .map_err(|e: T::Err| PipelineError::invalid(name, &raw, e))
}

/// Split a comma-separated variable into trimmed, non-empty items.
pub fn list_or(name: &str, default: &[&str]) -> Vec<String> {
    match var(name) {
        Some(raw) => split_list(&raw),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
