use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parses a duration given either as whole seconds (`"120"`) or in humantime
/// notation (`"2m"`, `"1500ms"`).
pub fn parse_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    let trimmed = raw.trim();
    match trimmed.parse::<u64>() {
        Ok(seconds) => Ok(Duration::from_secs(seconds)),
        Err(_) => humantime::parse_duration(trimmed),
    }
}

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A duration as written in the TOML file: `timeout = 120` or
/// `timeout = "2m"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub fn parse(&self) -> Result<Duration, humantime::DurationError> {
        match self {
            DurationValue::Seconds(seconds) => {
                Ok(Duration::from_secs(*seconds))
            }
            DurationValue::Text(raw) => parse_duration(raw),
        }
    }

    /// Raw text, for error messages.
    pub fn raw(&self) -> String {
        match self {
            DurationValue::Seconds(seconds) => seconds.to_string(),
            DurationValue::Text(raw) => raw.clone(),
        }
    }
}

impl From<&str> for DurationValue {
    fn from(raw: &str) -> Self {
        DurationValue::Text(raw.to_string())
    }
}
