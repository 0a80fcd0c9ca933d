//! Trade risk evaluator.
//!
//! Scores a single proposed trade against a weighted set of risk factors and
//! returns an assessment with an approve/deny recommendation. Factors whose
//! data is absent are omitted rather than zero-filled, so the factor list is
//! also the evidence trail for the score.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bw_types::errors::RiskResult;
use bw_types::trade::{
    RiskAssessmentResult, RiskFactor, RiskLevel, TradeRiskRequest, TradeSide,
};

/// Factor weights and policy knobs. Defaults carry the production policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub weight_position_size: f64,
    pub weight_leverage: f64,
    pub weight_concentration: f64,
    pub weight_volatility: f64,
    pub weight_liquidity: f64,
    /// Weight of the tight-stop penalty when a stop-loss is supplied.
    pub weight_stop_distance: f64,
    /// Weight of the flat penalty when no stop-loss is set.
    pub weight_missing_stop: f64,
    pub weight_balance_utilization: f64,
    /// Trades at or above this score are never auto-approved.
    pub approval_score_cutoff: f64,
    /// Leverage above which a very-high-risk trade is denied outright.
    pub leverage_denial_threshold: f64,
    /// Base fraction of portfolio value for the suggested max position.
    pub base_position_fraction: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            weight_position_size: 0.25,
            weight_leverage: 0.20,
            weight_concentration: 0.15,
            weight_volatility: 0.15,
            weight_liquidity: 0.10,
            weight_stop_distance: 0.10,
            weight_missing_stop: 0.15,
            weight_balance_utilization: 0.05,
            approval_score_cutoff: 80.0,
            leverage_denial_threshold: 10.0,
            base_position_fraction: 0.10,
        }
    }
}

pub const FACTOR_POSITION_SIZE: &str = "position-size";
pub const FACTOR_LEVERAGE: &str = "leverage";
pub const FACTOR_CONCENTRATION: &str = "concentration";
pub const FACTOR_VOLATILITY: &str = "volatility";
pub const FACTOR_LIQUIDITY: &str = "liquidity";
pub const FACTOR_STOP_DISTANCE: &str = "stop-distance";
pub const FACTOR_NO_STOP_LOSS: &str = "no-stop-loss";
pub const FACTOR_BALANCE_UTILIZATION: &str = "balance-utilization";

/// Stops tighter than this fraction of price draw a churn penalty.
const TIGHT_STOP_THRESHOLD: f64 = 0.02;

/// Stateless trade scorer.
#[derive(Debug, Clone, Default)]
pub struct TradeRiskEvaluator {
    config: EvaluatorConfig,
}

impl TradeRiskEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Score a trade request. Fails with a validation error when required
    /// inputs are missing; never substitutes defaults for them.
    pub fn evaluate(&self, request: &TradeRiskRequest) -> RiskResult<RiskAssessmentResult> {
        request.validate()?;

        let price = request.price.to_f64().unwrap_or(0.0);
        let position_value = request.position_value().to_f64().unwrap_or(0.0);
        let portfolio_value = request.portfolio_value.to_f64().unwrap_or(0.0);
        let available_balance = request.available_balance.to_f64().unwrap_or(0.0);
        let leverage = request.leverage.to_f64().unwrap_or(0.0);
        let volatility = request
            .market_context
            .as_ref()
            .and_then(|m| m.volatility);

        let mut factors = Vec::new();
        let mut warnings = Vec::new();

        // --- position size ---
        let size_ratio = position_value / portfolio_value;
        factors.push(self.factor(
            FACTOR_POSITION_SIZE,
            size_ratio,
            size_ratio * 100.0,
            self.config.weight_position_size,
            format!("Position is {:.1}% of portfolio value", size_ratio * 100.0),
        ));

        // --- leverage ---
        factors.push(self.factor(
            FACTOR_LEVERAGE,
            leverage,
            (leverage + 1.0).ln() * 20.0,
            self.config.weight_leverage,
            format!("{leverage:.1}x leverage"),
        ));
        if leverage > self.config.leverage_denial_threshold {
            warnings.push(format!(
                "leverage {leverage:.1}x exceeds {:.0}x",
                self.config.leverage_denial_threshold
            ));
        }

        // --- concentration (existing + new exposure to this symbol) ---
        let existing_exposure: Decimal = request
            .existing_positions
            .iter()
            .filter(|p| p.symbol == request.symbol)
            .map(|p| p.market_value.abs())
            .sum();
        let total_exposure =
            existing_exposure.to_f64().unwrap_or(0.0) + position_value;
        let concentration_ratio = total_exposure / portfolio_value;
        factors.push(self.factor(
            FACTOR_CONCENTRATION,
            concentration_ratio,
            concentration_ratio * 150.0,
            self.config.weight_concentration,
            format!(
                "Exposure to {} would be {:.1}% of portfolio",
                request.symbol,
                concentration_ratio * 100.0
            ),
        ));
        if concentration_ratio > 0.25 {
            warnings.push(format!("concentrated exposure to {}", request.symbol));
        }

        // --- market data factors (omitted when data is absent) ---
        if let Some(vol) = volatility {
            factors.push(self.factor(
                FACTOR_VOLATILITY,
                vol,
                vol * 200.0,
                self.config.weight_volatility,
                format!("Annualized volatility {:.1}%", vol * 100.0),
            ));
        }
        if let Some(liquidity) = request.market_context.as_ref().and_then(|m| m.liquidity) {
            factors.push(self.factor(
                FACTOR_LIQUIDITY,
                liquidity,
                (1.0 - liquidity) * 100.0,
                self.config.weight_liquidity,
                format!("Liquidity score {liquidity:.2}"),
            ));
            if liquidity < 0.3 {
                warnings.push(format!("low liquidity in {}", request.symbol));
            }
        }

        // --- stop-loss discipline ---
        match request.stop_loss {
            None => {
                factors.push(self.factor(
                    FACTOR_NO_STOP_LOSS,
                    1.0,
                    100.0,
                    self.config.weight_missing_stop,
                    "No stop-loss set".into(),
                ));
                warnings.push("no stop-loss set".into());
            }
            Some(stop) => {
                let stop_f = stop.to_f64().unwrap_or(0.0);
                let distance = (price - stop_f).abs() / price;
                let scaled = if distance < TIGHT_STOP_THRESHOLD {
                    (1.0 - distance / TIGHT_STOP_THRESHOLD) * 100.0
                } else {
                    0.0
                };
                factors.push(self.factor(
                    FACTOR_STOP_DISTANCE,
                    distance,
                    scaled,
                    self.config.weight_stop_distance,
                    format!("Stop-loss {:.2}% from entry", distance * 100.0),
                ));
            }
        }

        // --- balance utilization ---
        if available_balance > 0.0 {
            let utilization = position_value / available_balance;
            factors.push(self.factor(
                FACTOR_BALANCE_UTILIZATION,
                utilization,
                utilization * 50.0,
                self.config.weight_balance_utilization,
                format!("Uses {:.0}% of available balance", utilization * 100.0),
            ));
        }

        let score = factors
            .iter()
            .map(|f| f.contribution)
            .sum::<f64>()
            .clamp(0.0, 100.0);
        let level = RiskLevel::from_score(score);

        let approved = self.approval(level, score, &factors, leverage);

        let suggested_max_position =
            self.suggested_max_position(portfolio_value, price, volatility, leverage);
        let suggested_stop_loss = match request.stop_loss {
            Some(_) => None,
            None => self.suggested_stop(request.side, price, volatility),
        };

        let risk_reward_ratio = match (request.stop_loss, request.take_profit) {
            (Some(sl), Some(tp)) => {
                let downside = (request.price - sl).abs().to_f64().unwrap_or(0.0);
                let upside = (tp - request.price).abs().to_f64().unwrap_or(0.0);
                if downside > 0.0 {
                    Some(upside / downside)
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(ratio) = risk_reward_ratio {
            if ratio < 1.0 {
                warnings.push(format!("risk/reward ratio {ratio:.2} below 1"));
            }
        }

        let recommendations =
            self.recommendations(level, &factors, suggested_stop_loss, risk_reward_ratio);

        debug!(
            symbol = %request.symbol,
            score,
            level = %level,
            approved,
            "trade assessed"
        );

        Ok(RiskAssessmentResult {
            level,
            score,
            factors,
            recommendations,
            warnings,
            approved,
            suggested_max_position,
            suggested_stop_loss,
            risk_reward_ratio,
        })
    }

    fn factor(
        &self,
        name: &str,
        value: f64,
        scaled: f64,
        weight: f64,
        description: String,
    ) -> RiskFactor {
        RiskFactor {
            name: name.to_string(),
            value,
            weight,
            contribution: scaled.min(100.0).max(0.0) * weight,
            description,
        }
    }

    /// Approval policy. Critical is never auto-approved; very-high is denied
    /// when the no-stop-loss factor applies or leverage exceeds the denial
    /// threshold; everything else approves below the score cutoff.
    ///
    /// The very-high special cases are intentionally the only two — pending
    /// product confirmation this is the complete policy.
    fn approval(&self, level: RiskLevel, score: f64, factors: &[RiskFactor], leverage: f64) -> bool {
        match level {
            RiskLevel::Critical => false,
            RiskLevel::VeryHigh => {
                let missing_stop = factors.iter().any(|f| f.name == FACTOR_NO_STOP_LOSS);
                if missing_stop || leverage > self.config.leverage_denial_threshold {
                    false
                } else {
                    score < self.config.approval_score_cutoff
                }
            }
            _ => score < self.config.approval_score_cutoff,
        }
    }

    /// `portfolio_value × base_fraction × vol_adj × lev_adj ÷ price`, where
    /// the adjustments shrink with volatility and leverage.
    fn suggested_max_position(
        &self,
        portfolio_value: f64,
        price: f64,
        volatility: Option<f64>,
        leverage: f64,
    ) -> Option<Decimal> {
        let vol_adj = (1.0 - volatility.unwrap_or(0.0)).max(0.3);
        let log_lev = (leverage + 1.0).ln();
        let lev_adj = if log_lev > 0.0 {
            (1.0 / log_lev).max(0.2)
        } else {
            1.0
        };
        let quantity =
            portfolio_value * self.config.base_position_fraction * vol_adj * lev_adj / price;
        Decimal::from_f64(quantity)
    }

    /// Volatility-derived stop suggestion when the request carries none.
    fn suggested_stop(&self, side: TradeSide, price: f64, volatility: Option<f64>) -> Option<Decimal> {
        let pct = volatility.map(|v| v.clamp(0.02, 0.15)).unwrap_or(0.05);
        let stop = match side {
            TradeSide::Buy => price * (1.0 - pct),
            TradeSide::Sell => price * (1.0 + pct),
        };
        Decimal::from_f64(stop)
    }

    fn recommendations(
        &self,
        level: RiskLevel,
        factors: &[RiskFactor],
        suggested_stop: Option<Decimal>,
        risk_reward: Option<f64>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(stop) = suggested_stop {
            out.push(format!("Set a stop-loss near {stop:.2}"));
        }
        if level >= RiskLevel::High {
            out.push("Reduce position size to lower the overall risk score".into());
        }
        if factors
            .iter()
            .any(|f| f.name == FACTOR_LEVERAGE && f.value > 5.0)
        {
            out.push("Consider reducing leverage".into());
        }
        if factors
            .iter()
            .any(|f| f.name == FACTOR_CONCENTRATION && f.value > 0.25)
        {
            out.push("Rebalance to reduce single-symbol concentration".into());
        }
        if let Some(ratio) = risk_reward {
            out.push(format!("Risk/reward ratio is {ratio:.2}"));
        }
        out
    }
}
