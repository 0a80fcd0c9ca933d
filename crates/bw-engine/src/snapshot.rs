//! Snapshot source port and the published-metrics map.
//!
//! Writers publish a fresh immutable metrics bundle atomically; readers
//! always see the last fully published bundle (single writer per portfolio,
//! many readers, no in-place mutation).

use dashmap::DashMap;
use std::sync::Arc;

use bw_types::errors::{RiskError, RiskResult};
use bw_types::portfolio::{PortfolioRiskMetrics, PortfolioSnapshot};

/// Read port for the latest portfolio snapshot. A failure here makes the
/// trade evaluator fail closed: the trade is unassessable, never
/// auto-approved.
pub trait SnapshotSource: Send + Sync {
    fn latest(&self, portfolio_id: &str) -> RiskResult<PortfolioSnapshot>;
    fn portfolio_ids(&self) -> Vec<String>;
}

/// In-memory snapshot source for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemorySnapshotSource {
    snapshots: DashMap<String, PortfolioSnapshot>,
}

impl InMemorySnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, snapshot: PortfolioSnapshot) {
        self.snapshots.insert(snapshot.portfolio_id.clone(), snapshot);
    }

    pub fn remove(&self, portfolio_id: &str) {
        self.snapshots.remove(portfolio_id);
    }
}

impl SnapshotSource for InMemorySnapshotSource {
    fn latest(&self, portfolio_id: &str) -> RiskResult<PortfolioSnapshot> {
        self.snapshots
            .get(portfolio_id)
            .map(|s| s.clone())
            .ok_or_else(|| RiskError::PortfolioNotFound {
                portfolio_id: portfolio_id.to_string(),
            })
    }

    fn portfolio_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Per-portfolio cap on retained bundles for windowed rule aggregation.
const HISTORY_DEPTH: usize = 256;

/// Last-published metrics per portfolio plus a bounded history.
///
/// Publication is a single atomic map insert of an `Arc`; a reader either
/// sees the previous bundle or the new one, never a partial write.
#[derive(Debug, Default)]
pub struct MetricsPublisher {
    latest: DashMap<String, Arc<PortfolioRiskMetrics>>,
    history: DashMap<String, Vec<Arc<PortfolioRiskMetrics>>>,
}

impl MetricsPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a bundle, returning the shared handle.
    pub fn publish(&self, metrics: PortfolioRiskMetrics) -> Arc<PortfolioRiskMetrics> {
        let id = metrics.portfolio_id.clone();
        let shared = Arc::new(metrics);
        let mut entry = self.history.entry(id.clone()).or_default();
        entry.push(shared.clone());
        if entry.len() > HISTORY_DEPTH {
            let excess = entry.len() - HISTORY_DEPTH;
            entry.drain(..excess);
        }
        drop(entry);
        self.latest.insert(id, shared.clone());
        shared
    }

    /// The last-published bundle for a portfolio, if any.
    pub fn latest(&self, portfolio_id: &str) -> Option<Arc<PortfolioRiskMetrics>> {
        self.latest.get(portfolio_id).map(|m| m.clone())
    }

    /// Previously published bundles, oldest first.
    pub fn history(&self, portfolio_id: &str) -> Vec<PortfolioRiskMetrics> {
        self.history
            .get(portfolio_id)
            .map(|h| h.iter().map(|m| (**m).clone()).collect())
            .unwrap_or_default()
    }
}
