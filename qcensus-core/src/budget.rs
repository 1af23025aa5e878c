//! Per-tenant timeout budgeting.
//!
//! The invocation has a hard wall-clock limit. Each tenant query gets an equal
//! share of what is left after reserving a drain margin for aggregation and
//! delivery, but never less than a workable minimum: running slightly over
//! is preferred to starving every query.

use std::time::Duration;
use tokio::time::Instant;

/// Time reserved at the end of the invocation for aggregation and reporting.
pub const DEFAULT_DRAIN_MARGIN: Duration = Duration::from_secs(5);

/// Lowest total the budget is computed from.
pub const DEFAULT_TOTAL_FLOOR: Duration = Duration::from_secs(20);

/// Computes the timeout for each tenant query.
///
/// `per_tenant = max(min_per_tenant, floor((max(total, floor) - drain) / n))`.
/// With no tenants there is nothing to divide and `min_per_tenant` is
/// returned.
pub fn compute_budget(
    total: Duration,
    tenant_count: usize,
    min_per_tenant: Duration,
    drain_margin: Duration,
) -> Duration {
    TimeoutBudgeter::new(min_per_tenant)
        .with_drain_margin(drain_margin)
        .per_tenant(total, tenant_count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudgeter {
    min_per_tenant: Duration,
    drain_margin: Duration,
    total_floor: Duration,
}

impl TimeoutBudgeter {
    pub fn new(min_per_tenant: Duration) -> Self {
        Self {
            min_per_tenant,
            drain_margin: DEFAULT_DRAIN_MARGIN,
            total_floor: DEFAULT_TOTAL_FLOOR,
        }
    }

    pub fn with_drain_margin(mut self, drain_margin: Duration) -> Self {
        self.drain_margin = drain_margin;
        self
    }

    pub fn with_total_floor(mut self, total_floor: Duration) -> Self {
        self.total_floor = total_floor;
        self
    }

    pub fn per_tenant(&self, total: Duration, tenant_count: usize) -> Duration {
        if tenant_count == 0 {
            return self.min_per_tenant;
        }

        let allocatable = total
            .max(self.total_floor)
            .saturating_sub(self.drain_margin)
            .as_millis();
        // Whole milliseconds.
        let share_ms = allocatable / tenant_count as u128;
        let share = Duration::from_millis(
            u64::try_from(share_ms).unwrap_or(u64::MAX),
        );

        share.max(self.min_per_tenant)
    }
}

/// Wall-clock limit of one run, started when the run begins.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    total: Duration,
    drain_margin: Duration,
}

impl Deadline {
    pub fn start(total: Duration, drain_margin: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
            drain_margin,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the invocation limit; never negative.
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// True once only the drain margin is left. No new queries start past
    /// this point.
    pub fn is_draining(&self) -> bool {
        self.remaining() <= self.drain_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn no_tenants_returns_minimum() {
        let budget = compute_budget(120 * SECOND, 0, 10 * SECOND, 5 * SECOND);
        assert_eq!(budget, 10 * SECOND);
    }

    #[test]
    fn budget_is_split_evenly_after_drain_margin() {
        let budget = compute_budget(120 * SECOND, 5, SECOND, 5 * SECOND);
        assert_eq!(budget, 23 * SECOND);
    }

    #[test]
    fn split_is_floored_to_whole_milliseconds() {
        let budget = compute_budget(
            Duration::from_millis(25_000),
            3,
            Duration::from_millis(1),
            Duration::from_millis(5_000),
        );
        assert_eq!(budget, Duration::from_millis(6_666));
    }

    #[test]
    fn many_tenants_clamp_to_minimum() {
        // 20 units total, 100 tenants, minimum 10: the floor wins.
        let budget = compute_budget(20 * SECOND, 100, 10 * SECOND, 5 * SECOND);
        assert_eq!(budget, 10 * SECOND);
    }

    #[test]
    fn tiny_total_is_raised_to_floor() {
        let budget = compute_budget(SECOND, 1, Duration::ZERO, 5 * SECOND);
        assert_eq!(budget, 15 * SECOND);
    }

    #[test]
    fn margin_larger_than_total_does_not_underflow() {
        let budgeter = TimeoutBudgeter::new(2 * SECOND)
            .with_total_floor(Duration::ZERO)
            .with_drain_margin(60 * SECOND);
        assert_eq!(budgeter.per_tenant(10 * SECOND, 4), 2 * SECOND);
    }

    #[test]
    fn budget_never_drops_below_minimum() {
        let min = 3 * SECOND;
        for total_secs in [0_u64, 1, 19, 20, 21, 60, 120, 900] {
            let total = Duration::from_secs(total_secs);
            for tenants in 1..=250 {
                let budget = compute_budget(total, tenants, min, 5 * SECOND);
                assert!(
                    budget >= min,
                    "total={total_secs}s tenants={tenants} gave {budget:?}"
                );
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_drains_when_margin_is_reached() {
        let deadline = Deadline::start(30 * SECOND, 5 * SECOND);
        assert!(!deadline.is_draining());
        assert_eq!(deadline.remaining(), 30 * SECOND);

        tokio::time::advance(24 * SECOND).await;
        assert!(!deadline.is_draining());

        tokio::time::advance(2 * SECOND).await;
        assert!(deadline.is_draining());

        tokio::time::advance(60 * SECOND).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
