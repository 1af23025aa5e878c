use qcensus_core::{
    RunSettings, Secret, VhostName, VhostTemplate,
    infra::{AuthToken, ConnectionParams},
};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Fully resolved process configuration. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,
    pub budget: BudgetConfig,
    pub endpoints: EndpointsConfig,
    pub vhosts: VhostConfig,
    pub auth: AuthConfig,
    pub discovery: DiscoveryConfig,
    pub debug: DebugConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub use_tls: bool,
    /// True when user and password both fell back to `guest`.
    pub default_credentials: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetConfig {
    pub invocation_timeout: Duration,
    pub min_query_timeout: Duration,
    pub drain_margin: Duration,
    pub total_floor: Duration,
}

#[derive(Debug, Clone)]
pub struct EndpointsConfig {
    pub sink_url: Url,
    pub tenant_directory_url: Url,
    /// Timeout for the tenant directory and sink requests.
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct VhostConfig {
    pub template: VhostTemplate,
    pub core: VhostName,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<Secret>,
    pub token_type: String,
}

impl AuthConfig {
    pub fn auth_token(&self) -> Option<AuthToken> {
        self.token
            .clone()
            .map(|token| AuthToken::new(token, self.token_type.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub concurrency: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugConfig {
    /// Pause before each run.
    pub sleep: Option<Duration>,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl Config {
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            invocation_timeout: self.budget.invocation_timeout,
            min_query_timeout: self.budget.min_query_timeout,
            drain_margin: self.budget.drain_margin,
            total_floor: self.budget.total_floor,
            vhost_template: self.vhosts.template.clone(),
            core_vhost: self.vhosts.core.clone(),
            concurrency: self.discovery.concurrency,
        }
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.broker.host.clone(),
            port: self.broker.port,
            user: self.broker.user.clone(),
            password: self.broker.password.clone(),
            use_tls: self.broker.use_tls,
        }
    }
}
