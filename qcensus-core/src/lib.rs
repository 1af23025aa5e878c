//! Budgeted queue discovery across the per-tenant vhosts of a shared message
//! broker.
//!
//! A run lists the queues of a fixed core vhost, fetches the tenant ids from
//! a directory service, lists every tenant vhost under a per-tenant timeout
//! derived from the invocation budget, and delivers the merged
//! `vhost -> queues` mapping to a reporting sink.

pub mod aggregate;
pub mod budget;
pub mod discovery;
pub mod error;
pub mod infra;
pub mod orchestrator;
pub mod ports;
pub mod types;

pub use aggregate::Aggregator;
pub use budget::{Deadline, TimeoutBudgeter, compute_budget};
pub use discovery::{DiscoveryLoop, DiscoveryReport, VhostOutcome};
pub use error::{BrokerError, DirectoryError, ReportingError, RunError};
pub use orchestrator::{
    Orchestrator, RunOutcome, RunPhase, RunReport, RunSettings, RunSummary,
};
pub use ports::{BrokerQueryClient, ReportingSink, TenantDirectory};
pub use types::{
    AggregateResult, QueueList, Secret, TemplateError, TenantId, VhostName,
    VhostTemplate,
};
