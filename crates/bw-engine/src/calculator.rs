//! Portfolio risk calculator.
//!
//! Consumes a [`PortfolioSnapshot`] and produces the full
//! [`PortfolioRiskMetrics`] bundle via the metric library. Every invocation
//! computes from scratch; nothing is incrementally updated, so identical
//! snapshots always yield identical bundles.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;

use bw_stats as stats;
use bw_types::portfolio::{PortfolioRiskMetrics, PortfolioSnapshot};

/// Stateless calculator for portfolio risk metrics.
pub struct PortfolioRiskCalculator;

impl PortfolioRiskCalculator {
    /// Compute the full metrics bundle. An empty portfolio is valid and
    /// yields a zeroed bundle (leverage 1, beta 1) rather than an error.
    pub fn compute(snapshot: &PortfolioSnapshot) -> PortfolioRiskMetrics {
        if snapshot.positions.is_empty() {
            let mut empty = PortfolioRiskMetrics::empty(&snapshot.portfolio_id, snapshot.as_of);
            empty.total_value = snapshot.total_value;
            return empty;
        }

        let total_value = snapshot.total_value.to_f64().unwrap_or(0.0);
        let returns = &snapshot.daily_returns;
        let low_confidence = returns.len() < stats::MIN_VAR_OBSERVATIONS;

        // --- tail risk ---
        let var_95 = stats::historical_var(returns, 0.05, total_value);
        let var_99 = stats::historical_var(returns, 0.01, total_value);
        let var_999 = stats::historical_var(returns, 0.001, total_value);
        let es_95 = stats::expected_shortfall(returns, 0.05, total_value);
        let es_99 = stats::expected_shortfall(returns, 0.01, total_value);

        // --- per-position weights ---
        let weights: Vec<f64> = snapshot
            .positions
            .iter()
            .map(|p| {
                let mv = p.market_value.abs().to_f64().unwrap_or(0.0);
                if total_value > 0.0 {
                    mv / total_value
                } else {
                    0.0
                }
            })
            .collect();

        // --- exposure maps ---
        let mut sector_exposure: HashMap<String, f64> = HashMap::new();
        let mut currency_exposure: HashMap<String, f64> = HashMap::new();
        for (position, weight) in snapshot.positions.iter().zip(&weights) {
            let sector = position.sector.clone().unwrap_or_else(|| "unknown".into());
            *sector_exposure.entry(sector).or_insert(0.0) += weight;
            let currency = position.currency.clone().unwrap_or_else(|| "unknown".into());
            *currency_exposure.entry(currency).or_insert(0.0) += weight;
        }

        // --- correlation matrix from per-symbol correlation maps ---
        let held: Vec<&str> = snapshot.positions.iter().map(|p| p.symbol.as_str()).collect();
        let mut correlation_matrix: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for position in &snapshot.positions {
            let mut row: HashMap<String, f64> = position
                .correlation
                .iter()
                .filter(|(other, _)| held.contains(&other.as_str()))
                .map(|(other, corr)| (other.clone(), *corr))
                .collect();
            row.insert(position.symbol.clone(), 1.0);
            correlation_matrix.insert(position.symbol.clone(), row);
        }

        let beta = Self::portfolio_beta(snapshot, &weights);

        let gross = snapshot.gross_exposure().to_f64().unwrap_or(0.0);

        PortfolioRiskMetrics {
            portfolio_id: snapshot.portfolio_id.clone(),
            total_value: snapshot.total_value,
            var_95: Decimal::from_f64(var_95).unwrap_or_default(),
            var_99: Decimal::from_f64(var_99).unwrap_or_default(),
            var_999: Decimal::from_f64(var_999).unwrap_or_default(),
            expected_shortfall_95: Decimal::from_f64(es_95).unwrap_or_default(),
            expected_shortfall_99: Decimal::from_f64(es_99).unwrap_or_default(),
            daily_volatility: stats::volatility(returns),
            annualized_volatility: stats::annualized_volatility(returns),
            sharpe_ratio: stats::sharpe_ratio(returns, stats::DEFAULT_RISK_FREE_RATE),
            sortino_ratio: stats::sortino_ratio(returns, stats::DEFAULT_RISK_FREE_RATE),
            max_drawdown: stats::max_drawdown(returns),
            beta,
            herfindahl_index: stats::herfindahl_index(&weights),
            top_position_weight: stats::top_k_weight(&weights, 1),
            top5_weight: stats::top_k_weight(&weights, 5),
            sector_exposure,
            currency_exposure,
            correlation_matrix,
            leverage_ratio: stats::leverage_ratio(gross, total_value),
            margin_utilization: stats::margin_utilization(
                snapshot.used_margin.to_f64().unwrap_or(0.0),
                snapshot.available_balance.to_f64().unwrap_or(0.0),
            ),
            low_confidence,
            as_of: snapshot.as_of,
        }
    }

    /// Regression beta against the benchmark series when supplied, otherwise
    /// the value-weighted average of per-position betas (default 1.0).
    fn portfolio_beta(snapshot: &PortfolioSnapshot, weights: &[f64]) -> f64 {
        if let Some(benchmark) = &snapshot.benchmark_returns {
            if benchmark.len() == snapshot.daily_returns.len() && benchmark.len() >= 2 {
                return stats::beta(&snapshot.daily_returns, benchmark);
            }
        }
        let total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            return 1.0;
        }
        let weighted: f64 = snapshot
            .positions
            .iter()
            .zip(weights)
            .map(|(p, w)| p.beta.unwrap_or(1.0) * w)
            .sum();
        stats::sanitize(weighted / total_weight)
    }
}
