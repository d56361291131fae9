//! Typed readers for environment configuration
//!
//! Every reader treats an empty value the same as an unset variable, so a
//! `.env` line like `DB_PASSWORD=` falls back to the default instead of
//! producing an empty credential.

use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Read a variable, returning `None` when it is unset or blank
pub fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a variable that must be present
pub fn required(key: &str) -> Result<String> {
    var(key).ok_or_else(|| CommonError::MissingVar(key.to_string()))
}

/// Read a variable or fall back to `default`
pub fn string_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable, falling back to `default` when unset.
///
/// A value that is present but does not parse is an error rather than a
/// silent fallback.
pub fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match var(key) {
        Some(value) => value.parse().map_err(|_| CommonError::InvalidVar {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

/// Read a comma-separated list, falling back to `default` when unset
pub fn list_or(key: &str, default: &[&str]) -> Vec<String> {
    match var(key) {
        Some(value) => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
