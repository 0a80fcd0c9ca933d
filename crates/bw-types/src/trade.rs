use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::RiskResult;
use crate::portfolio::Position;
use crate::validation_error;

/// Direction of a proposed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "Buy"),
            TradeSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Asset classes the engine can assess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Equity,
    Crypto,
    Forex,
    Commodity,
    Bond,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetType::Equity => "Equity",
            AssetType::Crypto => "Crypto",
            AssetType::Forex => "Forex",
            AssetType::Commodity => "Commodity",
            AssetType::Bond => "Bond",
        };
        write!(f, "{}", s)
    }
}

/// Optional per-symbol market data supplied with a trade request.
///
/// All fields are fractions (0.30 = 30% annualized volatility, liquidity
/// score in [0,1]). Absence of a field omits the corresponding risk factor
/// rather than substituting a default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketContext {
    pub volatility: Option<f64>,
    pub liquidity: Option<f64>,
    pub beta: Option<f64>,
    /// Correlation of this symbol against symbols already held.
    pub correlation: HashMap<String, f64>,
}

/// A proposed (or just-executed) trade to be scored.
///
/// Immutable input; created per request and discarded after assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRiskRequest {
    pub user_id: String,
    pub account_id: String,
    pub symbol: String,
    pub asset_type: AssetType,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Decimal,
    pub portfolio_value: Decimal,
    pub available_balance: Decimal,
    pub existing_positions: Vec<Position>,
    pub market_context: Option<MarketContext>,
}

impl TradeRiskRequest {
    /// Notional value of the proposed position.
    pub fn position_value(&self) -> Decimal {
        self.quantity * self.price
    }

    /// Reject malformed input before any scoring runs. Required inputs are
    /// never silently defaulted.
    pub fn validate(&self) -> RiskResult<()> {
        if self.price <= Decimal::ZERO {
            return Err(validation_error!("price must be positive, got {}", self.price));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(validation_error!(
                "quantity must be positive, got {}",
                self.quantity
            ));
        }
        if self.portfolio_value <= Decimal::ZERO {
            return Err(validation_error!(
                "portfolio value must be positive, got {}",
                self.portfolio_value
            ));
        }
        if self.leverage < Decimal::ZERO {
            return Err(validation_error!(
                "leverage cannot be negative, got {}",
                self.leverage
            ));
        }
        if let Some(sl) = self.stop_loss {
            if sl <= Decimal::ZERO {
                return Err(validation_error!("stop-loss must be positive, got {}", sl));
            }
        }
        Ok(())
    }
}

/// One scored risk dimension — the evidence trail behind an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    /// Raw value before scaling (e.g. position/portfolio ratio).
    pub value: f64,
    /// Weight in [0,1]; weights across applicable factors need not sum to 1.
    pub weight: f64,
    /// `min(scaled value, 100) × weight`.
    pub contribution: f64,
    pub description: String,
}

/// Overall risk classification, ordered from safest to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
    Critical,
}

impl RiskLevel {
    /// Map a composite score in [0,100] onto a level.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            RiskLevel::Critical
        } else if score >= 75.0 {
            RiskLevel::VeryHigh
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::VeryLow => "very-low",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very-high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// The outcome of scoring one trade request. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessmentResult {
    pub level: RiskLevel,
    /// Composite score in [0,100].
    pub score: f64,
    /// Ordered factor list; only factors with available data appear.
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
    pub approved: bool,
    pub suggested_max_position: Option<Decimal>,
    pub suggested_stop_loss: Option<Decimal>,
    /// `|take_profit − price| / |price − stop_loss|` when both are supplied.
    pub risk_reward_ratio: Option<f64>,
}

impl RiskAssessmentResult {
    /// Whether a factor with the given name was applied.
    pub fn has_factor(&self, name: &str) -> bool {
        self.factors.iter().any(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_request() -> TradeRiskRequest {
        TradeRiskRequest {
            user_id: "u1".into(),
            account_id: "a1".into(),
            symbol: "AAPL".into(),
            asset_type: AssetType::Equity,
            side: TradeSide::Buy,
            quantity: dec!(100),
            price: dec!(150),
            stop_loss: None,
            take_profit: None,
            leverage: dec!(1),
            portfolio_value: dec!(1_000_000),
            available_balance: dec!(500_000),
            existing_positions: Vec::new(),
            market_context: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(base_request().validate().is_ok());
    }

    #[test]
    fn zero_price_rejected() {
        let mut req = base_request();
        req.price = Decimal::ZERO;
        assert!(req.validate().is_err());
    }

    #[test]
    fn negative_quantity_rejected() {
        let mut req = base_request();
        req.quantity = dec!(-10);
        assert!(req.validate().is_err());
    }

    #[test]
    fn zero_portfolio_value_rejected() {
        let mut req = base_request();
        req.portfolio_value = Decimal::ZERO;
        assert!(req.validate().is_err());
    }

    #[test]
    fn position_value() {
        assert_eq!(base_request().position_value(), dec!(15_000));
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_score(90.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Critical);
    }

    #[test]
    fn level_ordering_is_monotonic() {
        assert!(RiskLevel::VeryLow < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::VeryHigh);
        assert!(RiskLevel::VeryHigh < RiskLevel::Critical);

        // Level never decreases as score increases through the thresholds.
        let mut prev = RiskLevel::VeryLow;
        for s in 0..=100 {
            let level = RiskLevel::from_score(s as f64);
            assert!(level >= prev);
            prev = level;
        }
    }
}
