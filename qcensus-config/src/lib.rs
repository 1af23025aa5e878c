//! Configuration for qcensus.
//!
//! A [`Config`] is assembled once per process from environment variables (an
//! optional `.env` file fills in anything the process environment leaves
//! unset), an optional `qcensus.toml`, and built-in defaults, in that order of
//! precedence. Guard rails reject settings a run cannot work with and collect
//! softer issues as [`ConfigWarnings`].

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::{
    AuthConfig, BrokerConfig, BudgetConfig, Config, ConfigMetadata,
    DebugConfig, DiscoveryConfig, EndpointsConfig, VhostConfig,
};
pub use util::parse_duration;
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
