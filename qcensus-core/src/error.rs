use std::time::Duration;
use thiserror::Error;

use crate::orchestrator::RunPhase;

/// Boxed transport error kept as the `source` of adapter failures so the
/// port traits stay independent of any one HTTP or AMQP client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure listing the queues of one vhost.
///
/// Recoverable: the discovery loop logs it, omits the vhost and moves on.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("could not reach broker at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("broker query timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("access to vhost denied")]
    AccessDenied,
    #[error("vhost does not exist")]
    VhostNotFound,
    #[error("broker responded with status {status}")]
    Status { status: u16 },
    #[error("failed to decode queue listing: {0}")]
    Decode(#[source] BoxError),
}

/// The tenant id list could not be obtained. Fatal to the run.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("tenant directory request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("tenant directory at {url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("tenant directory returned an invalid tenant list: {0}")]
    InvalidBody(#[source] BoxError),
}

/// The aggregate could not be delivered. Fatal to the run.
#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("delivery to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("sink at {url} rejected delivery with status {status}")]
    Status { url: String, status: u16 },
}

/// Errors that abort a run. Per-vhost failures never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    TenantDirectory(#[from] DirectoryError),
    #[error(transparent)]
    Reporting(#[from] ReportingError),
}

impl RunError {
    /// Terminal phase the run ended in.
    pub fn phase(&self) -> RunPhase {
        match self {
            RunError::TenantDirectory(_) => RunPhase::AbortedDiscovering,
            RunError::Reporting(_) => RunPhase::AbortedReporting,
        }
    }
}
