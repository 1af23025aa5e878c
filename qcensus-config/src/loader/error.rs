use qcensus_core::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ConfigGuardRailError;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required setting {field} (set {env} or the config file)")]
    MissingValue {
        field: &'static str,
        env: &'static str,
    },
    #[error("invalid number for {field}: '{value}'")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid boolean for {field}: '{value}'")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid URL for {field}: '{value}'")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{field} must be an http or https URL, got scheme '{scheme}'")]
    UnsupportedScheme { field: &'static str, scheme: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
