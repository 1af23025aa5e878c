use qcensus_core::Secret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::DurationValue;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub broker: FileBrokerConfig,
    #[serde(default)]
    pub budget: FileBudgetConfig,
    #[serde(default)]
    pub endpoints: FileEndpointsConfig,
    #[serde(default)]
    pub vhosts: FileVhostConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub discovery: FileDiscoveryConfig,
    #[serde(default)]
    pub debug: FileDebugConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBrokerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_tls: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBudgetConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_timeout: Option<DurationValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_query_timeout: Option<DurationValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_margin: Option<DurationValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_floor: Option<DurationValue>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileEndpointsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_directory_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout: Option<DurationValue>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileVhostConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDiscoveryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDebugConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep: Option<DurationValue>,
}

/// Environment-derived configuration values, kept as raw strings until the
/// loader parses them so a malformed value can be reported by name.
///
/// Each setting is read from its upper-case name first and then from the
/// lower-case name the job has historically been deployed with.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub rabbit_host: Option<String>,
    pub rabbit_port: Option<String>,
    pub rabbit_user: Option<String>,
    pub rabbit_password: Option<Secret>,
    pub rabbit_use_tls: Option<String>,
    pub invocation_timeout: Option<String>,
    pub min_query_timeout: Option<String>,
    pub drain_margin: Option<String>,
    pub total_floor: Option<String>,
    pub sink_url: Option<String>,
    pub tenant_directory_url: Option<String>,
    pub http_timeout: Option<String>,
    pub vhost_template: Option<String>,
    pub core_vhost: Option<String>,
    pub token: Option<Secret>,
    pub token_type: Option<String>,
    pub concurrency: Option<String>,
    pub debug_sleep: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment view from an arbitrary variable lookup. Blank
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };

        Self {
            config_path: var(&["QCENSUS_CONFIG"]).map(PathBuf::from),
            rabbit_host: var(&["RABBIT_HOST", "rabbit_host"]),
            rabbit_port: var(&["RABBIT_PORT", "rabbit_port"]),
            rabbit_user: var(&["RABBIT_USER", "rabbit_user"]),
            rabbit_password: var(&["RABBIT_PASSWORD", "rabbit_password"])
                .map(Secret::from),
            rabbit_use_tls: var(&["RABBIT_USE_TLS", "rabbit_use_tls"]),
            invocation_timeout: var(&[
                "INVOCATION_TIMEOUT",
                "AWS_LAMBDA_FUNCTION_TIMEOUT",
            ]),
            min_query_timeout: var(&[
                "MIN_QUERY_TIMEOUT",
                "min_arbiter_timeout",
            ]),
            drain_margin: var(&["DRAIN_MARGIN", "drain_margin"]),
            total_floor: var(&["TOTAL_TIMEOUT_FLOOR"]),
            sink_url: var(&["SINK_URL", "put_url"]),
            tenant_directory_url: var(&[
                "TENANT_DIRECTORY_URL",
                "project_ids_get_url",
            ]),
            http_timeout: var(&["HTTP_TIMEOUT"]),
            vhost_template: var(&["VHOST_TEMPLATE", "vhost_template"]),
            core_vhost: var(&["CORE_VHOST", "core_vhost"]),
            token: var(&["AUTH_TOKEN", "token"]).map(Secret::from),
            token_type: var(&["AUTH_TOKEN_TYPE", "token_type"]),
            concurrency: var(&["DISCOVERY_CONCURRENCY"]),
            debug_sleep: var(&["DEBUG_SLEEP", "debug_sleep"]),
        }
    }
}
