use crate::types::{AggregateResult, QueueList, VhostName};

/// Builds the aggregate from the core vhost listing and the tenant fragment.
///
/// The core vhost goes first when it was listed. Queue names are passed
/// through untouched; a repeated vhost keeps the last listing.
#[derive(Debug, Default)]
pub struct Aggregator {
    result: AggregateResult,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, vhost: VhostName, queues: QueueList) {
        self.result.insert(vhost, queues);
    }

    pub fn finish(self) -> AggregateResult {
        self.result
    }

    pub fn merge(
        core: Option<(VhostName, QueueList)>,
        tenants: impl IntoIterator<Item = (VhostName, QueueList)>,
    ) -> AggregateResult {
        let mut aggregator = Self::new();
        if let Some((vhost, queues)) = core {
            aggregator.record(vhost, queues);
        }
        for (vhost, queues) in tenants {
            aggregator.record(vhost, queues);
        }
        aggregator.finish()
    }
}
