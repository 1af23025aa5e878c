use qcensus_core::infra::{DEFAULT_MANAGEMENT_PORT, http::json_headers};
use thiserror::Error;

use crate::models::Config;

/// AMQP listener port. Queues are listed through the management API, which
/// never listens here.
const AMQP_PORT: u16 = 5672;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("discovery concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("minimum per-tenant query timeout must be greater than zero")]
    ZeroMinQueryTimeout,
    #[error("auth token or token type is not a valid HTTP header value")]
    InvalidAuthHeader,
    #[error("broker host '{host}' does not form a valid management API URL")]
    InvalidBrokerHost { host: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.discovery.concurrency == 0 {
        return Err(ConfigGuardRailError::ZeroConcurrency);
    }
    if config.budget.min_query_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroMinQueryTimeout);
    }

    if config.connection_params().base_url().is_err() {
        return Err(ConfigGuardRailError::InvalidBrokerHost {
            host: config.broker.host.clone(),
        });
    }

    match config.auth.auth_token() {
        Some(token) => {
            if json_headers(Some(&token)).is_err() {
                return Err(ConfigGuardRailError::InvalidAuthHeader);
            }
        }
        None => warnings.push_with_hint(
            "No auth token configured; tenant directory and sink requests \
             are sent without Authorization",
            "Set AUTH_TOKEN (and AUTH_TOKEN_TYPE if not bearer)",
        ),
    }

    if config.broker.port == AMQP_PORT {
        warnings.push_with_hint(
            format!(
                "Broker port {AMQP_PORT} is the AMQP listener; queue listings \
                 go through the management API and will fail to connect"
            ),
            format!(
                "Set RABBIT_PORT to the management API port \
                 ({DEFAULT_MANAGEMENT_PORT} by default)"
            ),
        );
    }

    if config.broker.default_credentials {
        warnings.push_with_hint(
            "Broker credentials not configured; using guest/guest",
            "Set RABBIT_USER and RABBIT_PASSWORD",
        );
    }

    let budget = &config.budget;
    if budget.min_query_timeout > budget.invocation_timeout {
        warnings.push(format!(
            "Minimum per-tenant timeout ({}) exceeds the invocation timeout \
             ({}); a single slow tenant can outlast the run",
            humantime::format_duration(budget.min_query_timeout),
            humantime::format_duration(budget.invocation_timeout),
        ));
    }
    if budget.drain_margin >= budget.invocation_timeout {
        warnings.push_with_hint(
            "Drain margin covers the whole invocation budget; every tenant \
             will be skipped",
            "Lower DRAIN_MARGIN or raise INVOCATION_TIMEOUT",
        );
    }

    if let Some(sleep) = config.debug.sleep {
        warnings.push(format!(
            "Debug sleep of {} is applied before every run",
            humantime::format_duration(sleep)
        ));
    }

    Ok(warnings)
}
