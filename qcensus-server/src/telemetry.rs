use qcensus_config::ConfigWarnings;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Output goes to stderr so stdout stays free
/// for the invocation response. Override the filter via `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn,reqwest=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn log_config_warnings(warnings: &ConfigWarnings) {
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(
                    message = %warning.message,
                    hint = %hint,
                    "configuration warning"
                )
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }
}
