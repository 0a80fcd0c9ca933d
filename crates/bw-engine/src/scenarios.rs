//! Stress scenarios.
//!
//! Applies deterministic shock scenarios to a portfolio snapshot and reports
//! the estimated impact per position and in total. Pure functions: the same
//! snapshot and scenario always produce the same impact.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use bw_types::portfolio::PortfolioSnapshot;

/// The shock a scenario applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShockKind {
    /// Uniform market move applied to every position.
    MarketShock { market_change: f64 },
    /// Sector-keyed impacts; positions in unlisted sectors take the default.
    RateShock {
        sector_impacts: HashMap<String, f64>,
        default_impact: f64,
    },
    /// Currency-keyed impacts; positions in unlisted currencies take the
    /// default.
    CurrencyShock {
        currency_impacts: HashMap<String, f64>,
        default_impact: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    pub kind: ShockKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionImpact {
    pub symbol: String,
    pub impact: Decimal,
    pub impact_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressImpact {
    pub scenario: String,
    /// Total impact as a fraction of portfolio value (negative = loss).
    pub total_impact_pct: f64,
    pub affected_positions: Vec<PositionImpact>,
    pub recommendations: Vec<String>,
}

/// The standing scenario set run by default.
pub fn default_scenarios() -> Vec<StressScenario> {
    vec![
        StressScenario {
            name: "Market crash -20%".into(),
            kind: ShockKind::MarketShock {
                market_change: -0.20,
            },
        },
        StressScenario {
            name: "Interest rate hike".into(),
            kind: ShockKind::RateShock {
                sector_impacts: HashMap::from([
                    ("Banking".to_string(), 0.05),
                    ("Technology".to_string(), -0.10),
                    ("Utilities".to_string(), -0.08),
                ]),
                default_impact: -0.05,
            },
        },
        StressScenario {
            name: "Currency devaluation".into(),
            kind: ShockKind::CurrencyShock {
                currency_impacts: HashMap::from([("USD".to_string(), 0.0)]),
                default_impact: -0.15,
            },
        },
    ]
}

/// Apply one scenario to a snapshot.
pub fn apply(scenario: &StressScenario, snapshot: &PortfolioSnapshot) -> StressImpact {
    let total_value = snapshot.total_value.to_f64().unwrap_or(0.0);
    let mut affected = Vec::new();
    let mut total_impact = 0.0;

    for position in &snapshot.positions {
        let market_value = position.market_value.to_f64().unwrap_or(0.0);
        let pct = match &scenario.kind {
            ShockKind::MarketShock { market_change } => *market_change,
            ShockKind::RateShock {
                sector_impacts,
                default_impact,
            } => position
                .sector
                .as_deref()
                .and_then(|s| sector_impacts.get(s))
                .copied()
                .unwrap_or(*default_impact),
            ShockKind::CurrencyShock {
                currency_impacts,
                default_impact,
            } => position
                .currency
                .as_deref()
                .and_then(|c| currency_impacts.get(c))
                .copied()
                .unwrap_or(*default_impact),
        };

        let impact = market_value * pct;
        if impact != 0.0 {
            affected.push(PositionImpact {
                symbol: position.symbol.clone(),
                impact: Decimal::from_f64(impact).unwrap_or_default(),
                impact_pct: pct,
            });
            total_impact += impact;
        }
    }

    let total_impact_pct = if total_value > 0.0 {
        total_impact / total_value
    } else {
        0.0
    };

    StressImpact {
        scenario: scenario.name.clone(),
        total_impact_pct,
        recommendations: recommendations(scenario, total_impact_pct),
        affected_positions: affected,
    }
}

/// Run the full default scenario set.
pub fn run_stress_tests(snapshot: &PortfolioSnapshot) -> Vec<StressImpact> {
    default_scenarios()
        .iter()
        .map(|s| apply(s, snapshot))
        .collect()
}

fn recommendations(scenario: &StressScenario, impact_pct: f64) -> Vec<String> {
    let mut out = Vec::new();
    if impact_pct.abs() > 0.15 {
        out.push("Consider hedging strategies to protect against extreme scenarios".into());
        out.push("Review portfolio allocation and reduce concentrated positions".into());
    }
    match scenario.kind {
        ShockKind::MarketShock { .. } => {
            out.push("Increase allocation to defensive sectors".into());
        }
        ShockKind::RateShock { .. } => {
            out.push("Review exposure to rate-sensitive sectors".into());
        }
        ShockKind::CurrencyShock { .. } => {
            out.push("Review unhedged foreign-currency exposure".into());
        }
    }
    out
}
