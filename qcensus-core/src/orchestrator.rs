//! One discovery run: core vhost, tenant list, budgeted tenant discovery,
//! aggregation, delivery.
//!
//! ```text
//! Discovering ──> Reporting ──> Done
//!      │              │
//!      v              v
//! AbortedDiscovering  AbortedReporting
//! ```
//!
//! Only the tenant directory and the reporting sink can abort a run. Any
//! number of vhost failures, the core vhost included, still reach Reporting.

use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    aggregate::Aggregator,
    budget::{
        DEFAULT_DRAIN_MARGIN, DEFAULT_TOTAL_FLOOR, Deadline, TimeoutBudgeter,
    },
    discovery::{DiscoveryLoop, VhostOutcome},
    error::RunError,
    ports::{BrokerQueryClient, ReportingSink, TenantDirectory},
    types::{AggregateResult, VhostName, VhostTemplate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Discovering,
    Reporting,
    Done,
    AbortedDiscovering,
    AbortedReporting,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Discovering => "discovering",
            RunPhase::Reporting => "reporting",
            RunPhase::Done => "done",
            RunPhase::AbortedDiscovering => "aborted-discovering",
            RunPhase::AbortedReporting => "aborted-reporting",
        };
        f.write_str(name)
    }
}

/// Settings a run needs, extracted from process configuration.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Wall-clock limit imposed on the whole invocation.
    pub invocation_timeout: Duration,
    /// Lowest per-tenant timeout; also the core vhost's timeout.
    pub min_query_timeout: Duration,
    pub drain_margin: Duration,
    pub total_floor: Duration,
    pub vhost_template: VhostTemplate,
    pub core_vhost: VhostName,
    /// Tenant queries in flight at once.
    pub concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            invocation_timeout: Duration::from_secs(120),
            min_query_timeout: Duration::from_secs(10),
            drain_margin: DEFAULT_DRAIN_MARGIN,
            total_floor: DEFAULT_TOTAL_FLOOR,
            vhost_template: VhostTemplate::default(),
            core_vhost: VhostName::from("carrier"),
            concurrency: 1,
        }
    }
}

/// Counts describing how a successful run went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub core_listed: bool,
    pub tenants: usize,
    pub listed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub per_tenant_timeout: Duration,
    pub elapsed: Duration,
}

/// Aggregate as delivered to the sink, plus its summary.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub aggregate: AggregateResult,
    pub summary: RunSummary,
}

/// Success carries the delivered aggregate; failure the fatal error.
pub type RunOutcome = Result<RunReport, RunError>;

pub struct Orchestrator {
    broker: Arc<dyn BrokerQueryClient>,
    directory: Arc<dyn TenantDirectory>,
    sink: Arc<dyn ReportingSink>,
    settings: RunSettings,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        broker: Arc<dyn BrokerQueryClient>,
        directory: Arc<dyn TenantDirectory>,
        sink: Arc<dyn ReportingSink>,
        settings: RunSettings,
    ) -> Self {
        Self {
            broker,
            directory,
            sink,
            settings,
        }
    }

    /// Executes one run against a deadline starting now. All state lives
    /// for this call only.
    pub async fn run(&self) -> RunOutcome {
        let deadline = Deadline::start(
            self.settings.invocation_timeout,
            self.settings.drain_margin,
        );
        self.run_with_deadline(&deadline).await
    }

    /// Executes one run inside an invocation that began at `deadline`'s
    /// start. Time already spent counts against the drain check.
    pub async fn run_with_deadline(&self, deadline: &Deadline) -> RunOutcome {
        let settings = &self.settings;
        let mut phase = RunPhase::Discovering;
        let discovery =
            DiscoveryLoop::new(self.broker.as_ref(), &settings.vhost_template)
                .with_concurrency(settings.concurrency);

        debug!(vhost = %settings.core_vhost, "getting core vhost queues");
        let core = match discovery
            .list_vhost(&settings.core_vhost, settings.min_query_timeout)
            .await
        {
            VhostOutcome::Listed(queues) => {
                Some((settings.core_vhost.clone(), queues))
            }
            VhostOutcome::Failed(_) | VhostOutcome::Skipped => None,
        };

        debug!("getting tenant ids");
        let tenants = match self.directory.tenant_ids().await {
            Ok(tenants) => tenants,
            Err(err) => {
                let err = RunError::from(err);
                transition(&mut phase, err.phase());
                error!(
                    error = %err,
                    "could not fetch tenant ids, aborting run"
                );
                return Err(err);
            }
        };
        debug!(count = tenants.len(), "got tenant ids");

        let budgeter = TimeoutBudgeter::new(settings.min_query_timeout)
            .with_drain_margin(settings.drain_margin)
            .with_total_floor(settings.total_floor);
        let per_tenant =
            budgeter.per_tenant(deadline.remaining(), tenants.len());
        info!(
            tenants = tenants.len(),
            timeout = ?per_tenant,
            "per-tenant broker query timeout"
        );

        let report = discovery.discover(&tenants, per_tenant, deadline).await;
        let summary = RunSummary {
            core_listed: core.is_some(),
            tenants: tenants.len(),
            listed: report.listed_count(),
            failed: report.failed_count(),
            skipped: report.skipped_count(),
            per_tenant_timeout: per_tenant,
            elapsed: Duration::ZERO,
        };
        let aggregate = Aggregator::merge(core, report.into_listed());
        if aggregate.is_empty() {
            warn!("no vhost could be listed, delivering an empty aggregate");
        }

        transition(&mut phase, RunPhase::Reporting);
        if let Err(err) = self.sink.deliver(&aggregate).await {
            let err = RunError::from(err);
            transition(&mut phase, err.phase());
            error!(error = %err, "could not deliver aggregate, aborting run");
            return Err(err);
        }
        transition(&mut phase, RunPhase::Done);

        let summary = RunSummary {
            elapsed: deadline.elapsed(),
            ..summary
        };
        info!(
            vhosts = aggregate.len(),
            core_listed = summary.core_listed,
            listed = summary.listed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed = ?summary.elapsed,
            "run complete"
        );

        Ok(RunReport { aggregate, summary })
    }
}

fn transition(phase: &mut RunPhase, next: RunPhase) {
    debug!(from = %phase, to = %next, "run phase");
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{BrokerError, DirectoryError, ReportingError},
        ports::{
            MockBrokerQueryClient, MockReportingSink, MockTenantDirectory,
        },
        types::TenantId,
    };

    fn ids(raw: &[&str]) -> Vec<TenantId> {
        raw.iter().map(|id| TenantId::new(*id)).collect()
    }

    fn broker_with(
        answer: impl Fn(&str) -> Result<Vec<String>, BrokerError>
        + Send
        + Sync
        + 'static,
    ) -> MockBrokerQueryClient {
        let mut broker = MockBrokerQueryClient::new();
        broker
            .expect_list_queues()
            .returning(move |vhost, _| answer(vhost.as_str()));
        broker
    }

    fn directory_with(tenants: Vec<TenantId>) -> MockTenantDirectory {
        let mut directory = MockTenantDirectory::new();
        directory
            .expect_tenant_ids()
            .times(1)
            .returning(move || Ok(tenants.clone()));
        directory
    }

    fn accepting_sink() -> MockReportingSink {
        let mut sink = MockReportingSink::new();
        sink.expect_deliver().times(1).returning(|_| Ok(()));
        sink
    }

    fn orchestrator(
        broker: MockBrokerQueryClient,
        directory: MockTenantDirectory,
        sink: MockReportingSink,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(broker),
            Arc::new(directory),
            Arc::new(sink),
            RunSettings::default(),
        )
    }

    #[tokio::test]
    async fn partial_failures_still_report() {
        let broker = broker_with(|vhost| match vhost {
            "carrier" => Ok(vec!["core-q".into()]),
            "project_1_vhost" => Ok(vec!["q1".into()]),
            "project_2_vhost" => Ok(vec![]),
            _ => Err(BrokerError::AccessDenied),
        });
        let run = orchestrator(
            broker,
            directory_with(ids(&["1", "2", "3"])),
            accepting_sink(),
        );

        let report = run.run().await.expect("run should succeed");

        let vhosts: Vec<_> =
            report.aggregate.vhosts().map(VhostName::as_str).collect();
        assert_eq!(vhosts, ["carrier", "project_1_vhost", "project_2_vhost"]);
        assert_eq!(report.summary.listed, 2);
        assert_eq!(report.summary.failed, 1);
        assert!(report.summary.core_listed);
    }

    #[tokio::test]
    async fn core_vhost_failure_is_omitted_not_fatal() {
        let broker = broker_with(|vhost| match vhost {
            "carrier" => Err(BrokerError::VhostNotFound),
            _ => Ok(vec!["q".into()]),
        });
        let run =
            orchestrator(broker, directory_with(ids(&["9"])), accepting_sink());

        let report = run.run().await.expect("run should succeed");

        assert!(!report.aggregate.contains(&"carrier".into()));
        assert!(report.aggregate.contains(&"project_9_vhost".into()));
        assert!(!report.summary.core_listed);
    }

    #[tokio::test]
    async fn core_vhost_uses_minimum_timeout() {
        let mut broker = MockBrokerQueryClient::new();
        broker
            .expect_list_queues()
            .withf(|vhost, timeout| {
                vhost.as_str() == "carrier"
                    && *timeout == Duration::from_secs(10)
            })
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let run =
            orchestrator(broker, directory_with(vec![]), accepting_sink());

        let report = run.run().await.expect("run should succeed");

        assert_eq!(report.aggregate.len(), 1);
        assert_eq!(report.summary.per_tenant_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn directory_failure_aborts_before_reporting() {
        let broker = broker_with(|_| Ok(vec![]));
        let mut directory = MockTenantDirectory::new();
        directory.expect_tenant_ids().returning(|| {
            Err(DirectoryError::Status {
                url: "http://registry/ids".into(),
                status: 503,
            })
        });
        let mut sink = MockReportingSink::new();
        sink.expect_deliver().never();

        let err = orchestrator(broker, directory, sink)
            .run()
            .await
            .expect_err("run should abort");

        assert_eq!(err.phase(), RunPhase::AbortedDiscovering);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn sink_failure_aborts_run() {
        let broker = broker_with(|_| Ok(vec!["q".into()]));
        let mut sink = MockReportingSink::new();
        sink.expect_deliver().times(1).returning(|_| {
            Err(ReportingError::Status {
                url: "http://sink/queues".into(),
                status: 500,
            })
        });

        let err = orchestrator(broker, directory_with(ids(&["1"])), sink)
            .run()
            .await
            .expect_err("run should abort");

        assert_eq!(err.phase(), RunPhase::AbortedReporting);
        assert!(err.to_string().contains("rejected delivery"));
    }

    #[tokio::test]
    async fn sink_receives_exactly_the_successful_vhosts() {
        let broker = broker_with(|vhost| match vhost {
            "project_2_vhost" => Err(BrokerError::Timeout {
                timeout: Duration::from_secs(1),
            }),
            _ => Ok(vec![]),
        });
        let mut sink = MockReportingSink::new();
        sink.expect_deliver()
            .withf(|aggregate| {
                let vhosts: Vec<_> =
                    aggregate.vhosts().map(VhostName::as_str).collect();
                vhosts == ["carrier", "project_1_vhost", "project_3_vhost"]
            })
            .times(1)
            .returning(|_| Ok(()));

        orchestrator(broker, directory_with(ids(&["1", "2", "3"])), sink)
            .run()
            .await
            .expect("run should succeed");
    }

    struct SlowTenantBroker {
        per_query: Duration,
    }

    #[async_trait::async_trait]
    impl BrokerQueryClient for SlowTenantBroker {
        async fn list_queues(
            &self,
            vhost: &VhostName,
            _timeout: Duration,
        ) -> Result<Vec<String>, BrokerError> {
            if vhost.as_str() != "carrier" {
                tokio::time::sleep(self.per_query).await;
            }
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn short_invocation_drains_before_its_own_limit() {
        // Limit below the 20s total floor.
        let settings = RunSettings {
            invocation_timeout: Duration::from_secs(8),
            ..RunSettings::default()
        };
        let run = Orchestrator::new(
            Arc::new(SlowTenantBroker {
                per_query: Duration::from_secs(3),
            }),
            Arc::new(directory_with(ids(&["1", "2", "3"]))),
            Arc::new(accepting_sink()),
            settings,
        );

        let started = tokio::time::Instant::now();
        let report = run.run().await.expect("run should succeed");

        assert!(started.elapsed() <= Duration::from_secs(8));
        assert_eq!(report.summary.listed, 1);
        assert_eq!(report.summary.skipped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn time_spent_before_the_run_counts_against_the_deadline() {
        let run = Orchestrator::new(
            Arc::new(SlowTenantBroker {
                per_query: Duration::from_secs(3),
            }),
            Arc::new(directory_with(ids(&["1", "2", "3", "4"]))),
            Arc::new(accepting_sink()),
            RunSettings::default(),
        );
        let deadline =
            Deadline::start(Duration::from_secs(120), DEFAULT_DRAIN_MARGIN);
        tokio::time::sleep(Duration::from_secs(110)).await;

        let report = run
            .run_with_deadline(&deadline)
            .await
            .expect("run should succeed");

        assert!(deadline.elapsed() <= Duration::from_secs(120));
        assert_eq!(report.summary.listed, 2);
        assert_eq!(report.summary.skipped, 2);
    }
}
