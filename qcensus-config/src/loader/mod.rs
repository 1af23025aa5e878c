pub mod error;

use qcensus_core::{
    Secret, VhostName, VhostTemplate,
    budget::{DEFAULT_DRAIN_MARGIN, DEFAULT_TOTAL_FLOOR},
    infra::{DEFAULT_MANAGEMENT_PORT, DEFAULT_REQUEST_TIMEOUT},
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;
use url::Url;

use self::error::ConfigLoadError;
use crate::{
    models::{
        AuthConfig, BrokerConfig, BudgetConfig, Config, ConfigMetadata,
        DebugConfig, DiscoveryConfig, EndpointsConfig, VhostConfig,
    },
    sources::{EnvConfig, FileConfig},
    util::{DurationValue, parse_bool},
    validation::{self, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["qcensus.toml", "config/qcensus.toml"];
const DEFAULT_ENV_FILE: &str = ".env";

const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MIN_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CORE_VHOST: &str = "carrier";
const DEFAULT_TOKEN_TYPE: &str = "bearer";
const DEFAULT_BROKER_CREDENTIAL: &str = "guest";

#[derive(Debug, Default, Clone)]
struct ConfigLoaderOptions {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads from the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with_lookup(|name| std::env::var(name).ok())
    }

    /// Loads with `lookup` standing in for the process environment. Values
    /// from the `.env` file apply only where `lookup` has none, and the
    /// process environment itself is never modified.
    pub fn load_with_lookup<F>(
        &self,
        lookup: F,
    ) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_file = self.read_env_file()?;
        let env_file_loaded = env_file.is_some();
        let env_file = env_file.unwrap_or_default();

        let env_config = EnvConfig::from_lookup(|name| {
            lookup(name).or_else(|| env_file.get(name).cloned())
        });

        let (file_config, config_path) = self.load_file_config(&env_config)?;
        let metadata = ConfigMetadata {
            config_path,
            env_file_loaded,
        };

        let (config, warnings) = compose_config(
            file_config.unwrap_or_default(),
            env_config,
            metadata,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn read_env_file(
        &self,
    ) -> Result<Option<HashMap<String, String>>, ConfigLoadError> {
        let path = self
            .options
            .env_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));

        let iter = match dotenvy::from_path_iter(&path) {
            Ok(iter) => iter,
            Err(dotenvy::Error::Io(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let vars = iter.collect::<Result<HashMap<_, _>, _>>()?;
        debug!(path = %path.display(), count = vars.len(), "loaded env file");
        Ok(Some(vars))
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let file_config = read_file_config(&path)?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    let FileConfig {
        broker: file_broker,
        budget: file_budget,
        endpoints: file_endpoints,
        vhosts: file_vhosts,
        auth: file_auth,
        discovery: file_discovery,
        debug: file_debug,
    } = file;

    let host = env
        .rabbit_host
        .or(file_broker.host)
        .ok_or(ConfigLoadError::MissingValue {
            field: "broker.host",
            env: "RABBIT_HOST",
        })?;
    let port = match env.rabbit_port {
        Some(raw) => parse_number("broker.port", &raw)?,
        None => file_broker.port.unwrap_or(DEFAULT_MANAGEMENT_PORT),
    };
    let use_tls = match env.rabbit_use_tls {
        Some(raw) => parse_bool(&raw).ok_or(ConfigLoadError::InvalidBool {
            field: "broker.use_tls",
            value: raw,
        })?,
        None => file_broker.use_tls.unwrap_or(false),
    };
    let user = env.rabbit_user.or(file_broker.user);
    let password = env
        .rabbit_password
        .or_else(|| file_broker.password.map(Secret::from));
    let default_credentials = user.is_none() && password.is_none();
    let broker = BrokerConfig {
        host,
        port,
        user: user.unwrap_or_else(|| DEFAULT_BROKER_CREDENTIAL.to_string()),
        password: password
            .unwrap_or_else(|| Secret::new(DEFAULT_BROKER_CREDENTIAL)),
        use_tls,
        default_credentials,
    };

    let budget = BudgetConfig {
        invocation_timeout: resolve_duration(
            "budget.invocation_timeout",
            env.invocation_timeout,
            file_budget.invocation_timeout,
        )?
        .unwrap_or(DEFAULT_INVOCATION_TIMEOUT),
        min_query_timeout: resolve_duration(
            "budget.min_query_timeout",
            env.min_query_timeout,
            file_budget.min_query_timeout,
        )?
        .unwrap_or(DEFAULT_MIN_QUERY_TIMEOUT),
        drain_margin: resolve_duration(
            "budget.drain_margin",
            env.drain_margin,
            file_budget.drain_margin,
        )?
        .unwrap_or(DEFAULT_DRAIN_MARGIN),
        total_floor: resolve_duration(
            "budget.total_floor",
            env.total_floor,
            file_budget.total_floor,
        )?
        .unwrap_or(DEFAULT_TOTAL_FLOOR),
    };

    let endpoints = EndpointsConfig {
        sink_url: resolve_url(
            "endpoints.sink_url",
            "SINK_URL",
            env.sink_url.or(file_endpoints.sink_url),
        )?,
        tenant_directory_url: resolve_url(
            "endpoints.tenant_directory_url",
            "TENANT_DIRECTORY_URL",
            env.tenant_directory_url
                .or(file_endpoints.tenant_directory_url),
        )?,
        http_timeout: resolve_duration(
            "endpoints.http_timeout",
            env.http_timeout,
            file_endpoints.http_timeout,
        )?
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
    };

    let vhosts = VhostConfig {
        template: match env.vhost_template.or(file_vhosts.template) {
            Some(raw) => VhostTemplate::parse(raw)?,
            None => VhostTemplate::default(),
        },
        core: VhostName::new(
            env.core_vhost
                .or(file_vhosts.core)
                .unwrap_or_else(|| DEFAULT_CORE_VHOST.to_string()),
        ),
    };

    let auth = AuthConfig {
        token: env
            .token
            .or_else(|| file_auth.token.map(Secret::from))
            .filter(|token| !token.is_empty()),
        token_type: env
            .token_type
            .or(file_auth.token_type)
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
    };

    let discovery = DiscoveryConfig {
        concurrency: match env.concurrency {
            Some(raw) => parse_number("discovery.concurrency", &raw)?,
            None => file_discovery.concurrency.unwrap_or(1),
        },
    };

    let debug = DebugConfig {
        sleep: resolve_debug_sleep(
            env.debug_sleep,
            file_debug.sleep,
            &mut warnings,
        ),
    };

    let config = Config {
        broker,
        budget,
        endpoints,
        vhosts,
        auth,
        discovery,
        debug,
        metadata,
    };

    let guard_warnings = validation::apply_guard_rails(&config)?;
    warnings.extend(guard_warnings);

    Ok((config, warnings))
}

fn parse_number<T>(
    field: &'static str,
    raw: &str,
) -> Result<T, ConfigLoadError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    raw.trim()
        .parse()
        .map_err(|source| ConfigLoadError::InvalidNumber {
            field,
            value: raw.to_string(),
            source,
        })
}

/// Environment first, then file. `None` when neither sets it.
fn resolve_duration(
    field: &'static str,
    env: Option<String>,
    file: Option<DurationValue>,
) -> Result<Option<Duration>, ConfigLoadError> {
    let value = match (env, file) {
        (Some(raw), _) => DurationValue::Text(raw),
        (None, Some(value)) => value,
        (None, None) => return Ok(None),
    };
    value
        .parse()
        .map(Some)
        .map_err(|source| ConfigLoadError::InvalidDuration {
            field,
            value: value.raw(),
            source,
        })
}

fn resolve_url(
    field: &'static str,
    env_name: &'static str,
    raw: Option<String>,
) -> Result<Url, ConfigLoadError> {
    let raw = raw.ok_or(ConfigLoadError::MissingValue {
        field,
        env: env_name,
    })?;
    let url = Url::parse(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidUrl {
            field,
            value: raw.clone(),
            source,
        }
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigLoadError::UnsupportedScheme {
            field,
            scheme: scheme.to_string(),
        }),
    }
}

/// An unusable debug sleep is dropped with a warning rather than failing the
/// load.
fn resolve_debug_sleep(
    env: Option<String>,
    file: Option<DurationValue>,
    warnings: &mut ConfigWarnings,
) -> Option<Duration> {
    let value = env.map(DurationValue::Text).or(file)?;
    match value.parse() {
        Ok(sleep) if sleep.is_zero() => None,
        Ok(sleep) => Some(sleep),
        Err(err) => {
            warnings.push_with_hint(
                format!("Ignoring debug sleep '{}': {err}", value.raw()),
                "Use whole seconds or a duration such as \"3s\"",
            );
            None
        }
    }
}
