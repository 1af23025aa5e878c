//! Boundaries to the external collaborators of a run.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;

use crate::{
    error::{BrokerError, DirectoryError, ReportingError},
    types::{AggregateResult, QueueList, TenantId, VhostName},
};

/// Lists the queues of one vhost on the broker.
///
/// Connection parameters are bound when the client is built; each call
/// carries its own timeout and must fail cleanly within it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrokerQueryClient: Send + Sync {
    async fn list_queues(
        &self,
        vhost: &VhostName,
        timeout: Duration,
    ) -> Result<QueueList, BrokerError>;
}

/// Source of the tenant ids to discover in this run.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tenant_ids(&self) -> Result<Vec<TenantId>, DirectoryError>;
}

/// Destination of the final aggregate.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportingSink: Send + Sync {
    async fn deliver(
        &self,
        aggregate: &AggregateResult,
    ) -> Result<(), ReportingError>;
}
