use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single holding inside a portfolio snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub sector: Option<String>,
    pub currency: Option<String>,
    /// Beta versus the reference benchmark; 1.0 when unknown.
    pub beta: Option<f64>,
    /// Annualized volatility fraction for this symbol.
    pub volatility: Option<f64>,
    /// Pairwise correlation against other held symbols.
    pub correlation: HashMap<String, f64>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            average_price: price,
            current_price: price,
            market_value: quantity.abs() * price,
            unrealized_pnl: Decimal::ZERO,
            sector: None,
            currency: None,
            beta: None,
            volatility: None,
            correlation: HashMap::new(),
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }
}

/// Point-in-time view of a portfolio, supplied by an external source.
///
/// The engine never mutates a snapshot; recalculation always starts from a
/// fresh one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: String,
    pub account_id: String,
    pub total_value: Decimal,
    pub available_balance: Decimal,
    pub used_margin: Decimal,
    pub leverage: Decimal,
    pub positions: Vec<Position>,
    /// Time-ordered daily return fractions, oldest first.
    pub daily_returns: Vec<f64>,
    /// Benchmark return series aligned with `daily_returns`, if available.
    pub benchmark_returns: Option<Vec<f64>>,
    pub as_of: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// Sum of absolute position market values.
    pub fn gross_exposure(&self) -> Decimal {
        self.positions.iter().map(|p| p.market_value.abs()).sum()
    }

    /// Current exposure to one symbol across existing positions.
    pub fn exposure_to(&self, symbol: &str) -> Decimal {
        self.positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.market_value.abs())
            .sum()
    }
}

/// Full risk-metrics bundle for one portfolio.
///
/// Computed fresh on every invocation — never incrementally updated — so it
/// has no lifecycle beyond the invocation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskMetrics {
    pub portfolio_id: String,
    /// Total portfolio value at computation time, for percent-of-value rules.
    pub total_value: Decimal,

    // --- tail risk (monetary, 1-day) ---
    pub var_95: Decimal,
    pub var_99: Decimal,
    pub var_999: Decimal,
    pub expected_shortfall_95: Decimal,
    pub expected_shortfall_99: Decimal,

    // --- return distribution ---
    pub daily_volatility: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Maximum peak-to-trough decline over the supplied history, in [0,1].
    pub max_drawdown: f64,
    pub beta: f64,

    // --- concentration ---
    pub herfindahl_index: f64,
    pub top_position_weight: f64,
    pub top5_weight: f64,
    pub sector_exposure: HashMap<String, f64>,
    pub currency_exposure: HashMap<String, f64>,
    /// Pairwise correlations keyed by (symbol, symbol), diagonal = 1.
    pub correlation_matrix: HashMap<String, HashMap<String, f64>>,

    // --- leverage / margin ---
    pub leverage_ratio: f64,
    pub margin_utilization: f64,

    /// Set when the return history is too short for VaR/ES; tail metrics are
    /// zeroed rather than fabricated and callers must treat the bundle
    /// accordingly.
    pub low_confidence: bool,

    /// Copied from the source snapshot so recomputation is idempotent.
    pub as_of: DateTime<Utc>,
}

impl PortfolioRiskMetrics {
    /// Numeric field lookup by name, used by rule-condition evaluation.
    pub fn field(&self, name: &str) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        match name {
            "total_value" => self.total_value.to_f64(),
            "var_95_pct" => {
                let value = self.total_value.to_f64()?;
                if value <= 0.0 {
                    return Some(0.0);
                }
                self.var_95.to_f64().map(|v| v / value)
            }
            "var_95" => self.var_95.to_f64(),
            "var_99" => self.var_99.to_f64(),
            "var_999" => self.var_999.to_f64(),
            "expected_shortfall_95" => self.expected_shortfall_95.to_f64(),
            "expected_shortfall_99" => self.expected_shortfall_99.to_f64(),
            "daily_volatility" => Some(self.daily_volatility),
            "annualized_volatility" => Some(self.annualized_volatility),
            "sharpe_ratio" => Some(self.sharpe_ratio),
            "sortino_ratio" => Some(self.sortino_ratio),
            "max_drawdown" => Some(self.max_drawdown),
            "beta" => Some(self.beta),
            "herfindahl_index" => Some(self.herfindahl_index),
            "top_position_weight" => Some(self.top_position_weight),
            "top5_weight" => Some(self.top5_weight),
            "leverage_ratio" => Some(self.leverage_ratio),
            "margin_utilization" => Some(self.margin_utilization),
            _ => None,
        }
    }

    /// A zeroed bundle for an empty portfolio — a valid state, not an error.
    pub fn empty(portfolio_id: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            total_value: Decimal::ZERO,
            var_95: Decimal::ZERO,
            var_99: Decimal::ZERO,
            var_999: Decimal::ZERO,
            expected_shortfall_95: Decimal::ZERO,
            expected_shortfall_99: Decimal::ZERO,
            daily_volatility: 0.0,
            annualized_volatility: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            max_drawdown: 0.0,
            beta: 1.0,
            herfindahl_index: 0.0,
            top_position_weight: 0.0,
            top5_weight: 0.0,
            sector_exposure: HashMap::new(),
            currency_exposure: HashMap::new(),
            correlation_matrix: HashMap::new(),
            leverage_ratio: 1.0,
            margin_utilization: 0.0,
            low_confidence: true,
            as_of,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot_with_positions(positions: Vec<Position>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: "p1".into(),
            account_id: "a1".into(),
            total_value: dec!(100_000),
            available_balance: dec!(40_000),
            used_margin: dec!(10_000),
            leverage: dec!(1),
            positions,
            daily_returns: Vec::new(),
            benchmark_returns: None,
            as_of: Utc::now(),
        }
    }

    #[test]
    fn gross_exposure_sums_absolute_values() {
        let mut short = Position::new("TSLA", dec!(-50), dec!(200));
        short.market_value = dec!(-10_000);
        let snap = snapshot_with_positions(vec![
            Position::new("AAPL", dec!(100), dec!(150)),
            short,
        ]);
        assert_eq!(snap.gross_exposure(), dec!(25_000));
    }

    #[test]
    fn exposure_to_symbol() {
        let snap = snapshot_with_positions(vec![
            Position::new("AAPL", dec!(100), dec!(150)),
            Position::new("GOOG", dec!(10), dec!(180)),
        ]);
        assert_eq!(snap.exposure_to("AAPL"), dec!(15_000));
        assert_eq!(snap.exposure_to("MSFT"), Decimal::ZERO);
    }

    #[test]
    fn empty_bundle_defaults() {
        let m = PortfolioRiskMetrics::empty("p1", Utc::now());
        assert_eq!(m.leverage_ratio, 1.0);
        assert_eq!(m.beta, 1.0);
        assert_eq!(m.var_95, Decimal::ZERO);
        assert!(m.low_confidence);
    }

    #[test]
    fn field_lookup() {
        let mut m = PortfolioRiskMetrics::empty("p1", Utc::now());
        m.max_drawdown = 0.2;
        assert_eq!(m.field("max_drawdown"), Some(0.2));
        assert_eq!(m.field("beta"), Some(1.0));
        assert_eq!(m.field("no_such_field"), None);
    }

    #[test]
    fn metrics_serialization_roundtrip() {
        let m = PortfolioRiskMetrics::empty("p1", Utc::now());
        let json = serde_json::to_string(&m).unwrap();
        let back: PortfolioRiskMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
