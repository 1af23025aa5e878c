//! Tenant vhost discovery.
//!
//! Every tenant is queried under the same per-tenant timeout, in the order
//! the directory returned them. A failing vhost is logged and left out of
//! the result; it never stops the loop.

use futures::{StreamExt, stream};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    budget::Deadline,
    error::BrokerError,
    ports::BrokerQueryClient,
    types::{QueueList, TenantId, VhostName, VhostTemplate},
};

/// Result of querying a single vhost.
#[derive(Debug)]
pub enum VhostOutcome {
    Listed(QueueList),
    Failed(BrokerError),
    /// Not queried because the invocation had reached its drain margin.
    Skipped,
}

impl VhostOutcome {
    pub fn is_listed(&self) -> bool {
        matches!(self, VhostOutcome::Listed(_))
    }
}

#[derive(Debug)]
pub struct DiscoveredVhost {
    pub vhost: VhostName,
    pub outcome: VhostOutcome,
}

/// Per-tenant outcomes in input order.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub entries: Vec<DiscoveredVhost>,
}

impl DiscoveryReport {
    /// Successful listings only, consuming the report. This is the fragment
    /// merged into the aggregate.
    pub fn into_listed(self) -> impl Iterator<Item = (VhostName, QueueList)> {
        self.entries.into_iter().filter_map(|entry| match entry.outcome {
            VhostOutcome::Listed(queues) => Some((entry.vhost, queues)),
            VhostOutcome::Failed(_) | VhostOutcome::Skipped => None,
        })
    }

    pub fn listed_count(&self) -> usize {
        self.count(|outcome| outcome.is_listed())
    }

    pub fn failed_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, VhostOutcome::Failed(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, VhostOutcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&VhostOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }
}

pub struct DiscoveryLoop<'a> {
    broker: &'a dyn BrokerQueryClient,
    template: &'a VhostTemplate,
    concurrency: usize,
}

impl std::fmt::Debug for DiscoveryLoop<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryLoop")
            .field("template", &self.template)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl<'a> DiscoveryLoop<'a> {
    pub fn new(
        broker: &'a dyn BrokerQueryClient,
        template: &'a VhostTemplate,
    ) -> Self {
        Self {
            broker,
            template,
            concurrency: 1,
        }
    }

    /// Number of tenant queries allowed in flight at once. `1` queries
    /// strictly one after another.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Queries every tenant's vhost and returns the outcomes in input order.
    ///
    /// Queries that would start after the deadline entered its drain margin
    /// are skipped.
    pub async fn discover(
        &self,
        tenants: &[TenantId],
        per_tenant: Duration,
        deadline: &Deadline,
    ) -> DiscoveryReport {
        // Rendered up front so no closure over `&TenantId` is held across an
        // await (keeps the future `Send` for higher-ranked callers).
        let vhosts: Vec<VhostName> = tenants
            .iter()
            .map(|tenant| self.template.render(tenant))
            .collect();
        let entries = stream::iter(vhosts)
            .map(|vhost| {
                async move {
                    let outcome = if deadline.is_draining() {
                        warn!(
                            vhost = %vhost,
                            remaining = ?deadline.remaining(),
                            "invocation budget exhausted, skipping vhost"
                        );
                        VhostOutcome::Skipped
                    } else {
                        self.list_vhost(&vhost, per_tenant).await
                    };
                    DiscoveredVhost { vhost, outcome }
                }
            })
            // Ordered: results come back in tenant order whatever finishes
            // first.
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        DiscoveryReport { entries }
    }

    /// Lists one vhost, converting a broker failure into
    /// [`VhostOutcome::Failed`].
    pub async fn list_vhost(
        &self,
        vhost: &VhostName,
        timeout: Duration,
    ) -> VhostOutcome {
        debug!(vhost = %vhost, timeout = ?timeout, "listing queues");
        match self.broker.list_queues(vhost, timeout).await {
            Ok(queues) => {
                debug!(vhost = %vhost, queues = queues.len(), "listed queues");
                VhostOutcome::Listed(queues)
            }
            Err(err) => {
                warn!(
                    vhost = %vhost,
                    error = %err,
                    "vhost query failed, skipping"
                );
                VhostOutcome::Failed(err)
            }
        }
    }
}
