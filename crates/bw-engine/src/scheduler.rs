//! Recurring portfolio risk recalculation.
//!
//! The scheduler is the external trigger from the engine's point of view:
//! it owns the timer and hands an explicit `now` into the pure recalculation
//! entry point. Portfolios are independent — one failing recalculation never
//! aborts the others, it just retries on the next tick.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use bw_types::errors::RiskResult;
use bw_types::portfolio::PortfolioRiskMetrics;

use crate::RiskEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
        }
    }
}

/// Drives [`RiskEngine::recalculate_portfolio`] for every known portfolio on
/// a fixed interval.
pub struct RiskScheduler {
    engine: Arc<RiskEngine>,
    config: SchedulerConfig,
}

impl RiskScheduler {
    pub fn new(engine: Arc<RiskEngine>, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// One full recalculation pass across all active portfolios, fanned out
    /// over the thread pool. Returns the per-portfolio outcome.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<(String, RiskResult<Arc<PortfolioRiskMetrics>>)> {
        let ids = self.engine.portfolio_ids();
        ids.into_par_iter()
            .map(|id| {
                let result = self.engine.recalculate_portfolio(&id, now);
                if let Err(e) = &result {
                    warn!(portfolio_id = %id, error = %e, "recalculation failed, will retry next tick");
                }
                (id, result)
            })
            .collect()
    }

    /// Run the recalculation loop until the owning task is aborted.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_seconds));
        loop {
            interval.tick().await;
            let results = self.tick(Utc::now());
            let failures = results.iter().filter(|(_, r)| r.is_err()).count();
            info!(
                portfolios = results.len(),
                failures, "scheduled recalculation pass complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{InMemorySnapshotSource, SnapshotSource};
    use bw_alerts::{AlertManager, LifecycleConfig, MemoryAlertStore, MemoryRuleStore};
    use bw_types::errors::RiskError;
    use bw_types::portfolio::{PortfolioSnapshot, Position};
    use crossbeam_channel::unbounded;
    use rust_decimal_macros::dec;

    fn snapshot(portfolio_id: &str) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: portfolio_id.into(),
            account_id: "a1".into(),
            total_value: dec!(1_000_000),
            available_balance: dec!(500_000),
            used_margin: dec!(0),
            leverage: dec!(1),
            positions: vec![Position::new("AAPL", dec!(100), dec!(150))],
            daily_returns: Vec::new(),
            benchmark_returns: None,
            as_of: Utc::now(),
        }
    }

    /// Source that reports an id whose snapshot fetch always fails.
    struct FlakySource {
        inner: InMemorySnapshotSource,
        broken_id: String,
    }

    impl SnapshotSource for FlakySource {
        fn latest(&self, portfolio_id: &str) -> RiskResult<PortfolioSnapshot> {
            if portfolio_id == self.broken_id {
                return Err(RiskError::UpstreamUnavailable {
                    source_name: "snapshot".into(),
                    message: "connection refused".into(),
                });
            }
            self.inner.latest(portfolio_id)
        }

        fn portfolio_ids(&self) -> Vec<String> {
            let mut ids = self.inner.portfolio_ids();
            ids.push(self.broken_id.clone());
            ids.sort();
            ids
        }
    }

    fn engine(source: Arc<dyn SnapshotSource>) -> Arc<RiskEngine> {
        let (tx, _rx) = unbounded();
        let alerts = Arc::new(AlertManager::new(
            Arc::new(MemoryAlertStore::new()),
            LifecycleConfig::default(),
            tx,
        ));
        Arc::new(RiskEngine::new(
            source,
            Arc::new(MemoryRuleStore::new()),
            alerts,
        ))
    }

    #[test]
    fn tick_recalculates_every_portfolio() {
        let source = Arc::new(InMemorySnapshotSource::new());
        source.upsert(snapshot("p1"));
        source.upsert(snapshot("p2"));
        let engine = engine(source);
        let scheduler = RiskScheduler::new(engine.clone(), SchedulerConfig::default());

        let results = scheduler.tick(Utc::now());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(engine.latest_metrics("p1").is_some());
        assert!(engine.latest_metrics("p2").is_some());
    }

    #[test]
    fn one_failing_portfolio_does_not_abort_the_rest() {
        let inner = InMemorySnapshotSource::new();
        inner.upsert(snapshot("healthy"));
        let source = Arc::new(FlakySource {
            inner,
            broken_id: "broken".into(),
        });
        let engine = engine(source);
        let scheduler = RiskScheduler::new(engine.clone(), SchedulerConfig::default());

        let results = scheduler.tick(Utc::now());
        assert_eq!(results.len(), 2);
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(failed, 1);
        assert!(engine.latest_metrics("healthy").is_some());
        assert!(engine.latest_metrics("broken").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_on_schedule() {
        let source = Arc::new(InMemorySnapshotSource::new());
        source.upsert(snapshot("p1"));
        let engine = engine(source);
        let scheduler = Arc::new(RiskScheduler::new(
            engine.clone(),
            SchedulerConfig { interval_seconds: 60 },
        ));

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        // First tick fires immediately.
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert!(engine.latest_metrics("p1").is_some());

        handle.abort();
    }
}
