//! Bulwark risk decision engine.
//!
//! Ties the trade evaluator, portfolio calculator, limit monitor, and alert
//! lifecycle together behind two entry points: synchronous trade assessment
//! on the trading critical path, and scheduled per-portfolio recalculation.

pub mod calculator;
pub mod evaluator;
pub mod scenarios;
pub mod scheduler;
pub mod snapshot;

pub use calculator::PortfolioRiskCalculator;
pub use evaluator::{EvaluatorConfig, TradeRiskEvaluator};
pub use scheduler::{RiskScheduler, SchedulerConfig};
pub use snapshot::{InMemorySnapshotSource, MetricsPublisher, SnapshotSource};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use bw_alerts::{AlertManager, LimitMonitor, MonitorConfig, RuleSource};
use bw_types::alerts::{AlertSubject, CandidateAlert};
use bw_types::errors::{RiskError, RiskResult};
use bw_types::portfolio::PortfolioRiskMetrics;
use bw_types::trade::{RiskAssessmentResult, TradeRiskRequest};
use rust_decimal::Decimal;

/// Engine-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct RiskEngineConfig {
    pub evaluator: EvaluatorConfig,
    pub monitor: MonitorConfig,
}

/// The risk engine. Ports for snapshots, rules, and alert storage are
/// injected; there is no hidden global state.
pub struct RiskEngine {
    evaluator: TradeRiskEvaluator,
    monitor: LimitMonitor,
    snapshots: Arc<dyn SnapshotSource>,
    rules: Arc<dyn RuleSource>,
    alerts: Arc<AlertManager>,
    publisher: Arc<MetricsPublisher>,
}

impl RiskEngine {
    pub fn new(
        snapshots: Arc<dyn SnapshotSource>,
        rules: Arc<dyn RuleSource>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self::with_config(RiskEngineConfig::default(), snapshots, rules, alerts)
    }

    pub fn with_config(
        config: RiskEngineConfig,
        snapshots: Arc<dyn SnapshotSource>,
        rules: Arc<dyn RuleSource>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            evaluator: TradeRiskEvaluator::new(config.evaluator),
            monitor: LimitMonitor::new(config.monitor),
            snapshots,
            rules,
            alerts,
            publisher: Arc::new(MetricsPublisher::new()),
        }
    }

    /// Assess a proposed trade synchronously.
    ///
    /// Reads the latest snapshot through the snapshot port to fill portfolio
    /// context the request leaves unset. If the snapshot source fails, the
    /// trade is unassessable and the call fails closed — it is never
    /// auto-approved.
    pub fn assess_trade(
        &self,
        portfolio_id: &str,
        mut request: TradeRiskRequest,
        now: DateTime<Utc>,
    ) -> RiskResult<RiskAssessmentResult> {
        let snapshot = self.snapshots.latest(portfolio_id).map_err(|e| {
            warn!(portfolio_id, error = %e, "snapshot unavailable, failing closed");
            RiskError::UpstreamUnavailable {
                source_name: "snapshot".into(),
                message: e.to_string(),
            }
        })?;

        if request.portfolio_value <= Decimal::ZERO {
            request.portfolio_value = snapshot.total_value;
        }
        if request.available_balance <= Decimal::ZERO {
            request.available_balance = snapshot.available_balance;
        }
        if request.existing_positions.is_empty() {
            request.existing_positions = snapshot.positions.clone();
        }

        let assessment = self.evaluator.evaluate(&request)?;

        let subject = AlertSubject {
            portfolio_id: Some(portfolio_id.to_string()),
            account_id: Some(request.account_id.clone()),
            user_id: Some(request.user_id.clone()),
            trade_id: None,
        };
        let rules = self.rules_in_scope(&subject);
        let candidates = self
            .monitor
            .evaluate_assessment(&assessment, &subject, &rules, now);
        self.route_candidates(candidates, now);

        Ok(assessment)
    }

    /// Recalculate one portfolio: fetch the snapshot, compute a fresh
    /// metrics bundle, publish it, and run the limit monitor over it.
    pub fn recalculate_portfolio(
        &self,
        portfolio_id: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<Arc<PortfolioRiskMetrics>> {
        let snapshot = self.snapshots.latest(portfolio_id)?;
        let metrics = PortfolioRiskCalculator::compute(&snapshot);

        let subject = AlertSubject {
            portfolio_id: Some(portfolio_id.to_string()),
            account_id: Some(snapshot.account_id.clone()),
            user_id: None,
            trade_id: None,
        };
        let rules = self.rules_in_scope(&subject);
        // History must predate this publication, or windowed aggregations
        // would double-count the current bundle.
        let history = self.publisher.history(portfolio_id);
        let candidates = self
            .monitor
            .evaluate_metrics(&metrics, &subject, &rules, &history, now);

        let published = self.publisher.publish(metrics);
        info!(
            portfolio_id,
            low_confidence = published.low_confidence,
            candidates = candidates.len(),
            "portfolio risk recalculated"
        );
        self.route_candidates(candidates, now);

        Ok(published)
    }

    /// Last-published metrics for a portfolio, if any recalculation ran.
    pub fn latest_metrics(&self, portfolio_id: &str) -> Option<Arc<PortfolioRiskMetrics>> {
        self.publisher.latest(portfolio_id)
    }

    /// Portfolio ids known to the snapshot source.
    pub fn portfolio_ids(&self) -> Vec<String> {
        self.snapshots.portfolio_ids()
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    /// Rule-source failures degrade to the built-in defaults instead of
    /// blocking assessment.
    fn rules_in_scope(&self, subject: &AlertSubject) -> Vec<bw_types::alerts::AlertingRule> {
        match self.rules.rules_for(subject) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "rule source unavailable, using defaults");
                Vec::new()
            }
        }
    }

    /// Hand candidates to the lifecycle manager; a failure on one candidate
    /// never blocks the others.
    fn route_candidates(&self, candidates: Vec<CandidateAlert>, now: DateTime<Utc>) {
        for candidate in candidates {
            if let Err(e) = self.alerts.create(candidate, now) {
                warn!(error = %e, "failed to create alert from candidate");
            }
        }
    }
}
