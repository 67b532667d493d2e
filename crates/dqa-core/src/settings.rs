//! Helpers for reading typed settings from environment-style lookups
//!
//! Configuration structs take a `lookup` closure instead of reading the process
//! environment directly, so they can be exercised with fixed key sets.

use std::str::FromStr;

use crate::{Error, Result};

/// Parse `key` with `FromStr`, falling back to `default` when unset
pub fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::Configuration(format!("{} has an invalid value: '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

/// Parse a boolean flag accepting `1/0`, `true/false`, `yes/no`, `on/off`
pub fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Configuration(format!(
                "{} must be a boolean, got '{}'",
                key, raw
            ))),
        },
        None => Ok(default),
    }
}
