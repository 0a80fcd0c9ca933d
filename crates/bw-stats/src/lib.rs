//! Pure statistical functions behind the Bulwark risk metrics.
//!
//! Every function is deterministic and side-effect free: identical input
//! sequences produce identical output, with no RNG and no wall-clock reads.
//! Non-finite intermediate results are mapped to 0.0 at this boundary via
//! [`sanitize`] rather than propagated.

use tracing::warn;

/// Minimum number of return observations for VaR/ES to be meaningful.
/// Below this, tail metrics return 0 and callers must flag the bundle as
/// low-confidence rather than fabricate a number.
pub const MIN_VAR_OBSERVATIONS: usize = 30;

/// Trading days per year, used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Default annual risk-free rate for Sharpe/Sortino.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Map non-finite values to 0.0. This is the ComputationError boundary:
/// a NaN or infinity coming out of a formula degrades to a safe default
/// instead of crossing into callers.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        warn!(value = %value, "non-finite metric result mapped to 0");
        0.0
    }
}

/// Arithmetic mean; 0.0 on an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1 denominator); 0.0 below two samples.
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    sanitize(variance.sqrt())
}

/// Daily volatility: sample standard deviation of daily returns.
pub fn volatility(returns: &[f64]) -> f64 {
    sample_stdev(returns)
}

/// Annualized volatility: daily volatility × √252.
pub fn annualized_volatility(returns: &[f64]) -> f64 {
    sanitize(volatility(returns) * TRADING_DAYS.sqrt())
}

/// 1-day historical-simulation Value-at-Risk at the given tail probability
/// (0.05 for 95% confidence), as a positive monetary amount.
///
/// Sorts returns ascending and takes the value at index `floor(n·tail)`.
/// Returns 0.0 below [`MIN_VAR_OBSERVATIONS`].
pub fn historical_var(returns: &[f64], tail: f64, portfolio_value: f64) -> f64 {
    if returns.len() < MIN_VAR_OBSERVATIONS {
        return 0.0;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let idx = ((sorted.len() as f64) * tail).floor() as usize;
    let idx = idx.min(sorted.len() - 1);
    sanitize(sorted[idx].abs() * portfolio_value)
}

/// Expected Shortfall: mean of the sorted returns at or below the VaR
/// quantile index, scaled by portfolio value. 0.0 below the observation
/// minimum.
pub fn expected_shortfall(returns: &[f64], tail: f64, portfolio_value: f64) -> f64 {
    if returns.len() < MIN_VAR_OBSERVATIONS {
        return 0.0;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let idx = ((sorted.len() as f64) * tail).floor() as usize;
    let idx = idx.min(sorted.len() - 1);
    let tail_slice = &sorted[..=idx];
    sanitize(mean(tail_slice).abs() * portfolio_value)
}

/// Annualized Sharpe ratio over daily returns. Zero volatility yields 0,
/// never NaN or infinity.
pub fn sharpe_ratio(returns: &[f64], annual_risk_free: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = annual_risk_free / TRADING_DAYS;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let sd = sample_stdev(&excess);
    if sd == 0.0 {
        return 0.0;
    }
    sanitize(mean(&excess) / sd * TRADING_DAYS.sqrt())
}

/// Annualized Sortino ratio: same numerator as Sharpe, denominator is the
/// downside deviation over returns below the daily risk-free rate. Zero
/// downside observations yield 0.
pub fn sortino_ratio(returns: &[f64], annual_risk_free: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = annual_risk_free / TRADING_DAYS;
    let downside: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|r| (r - daily_rf) * (r - daily_rf))
        .collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_dev = (downside.iter().sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    let excess_mean = mean(returns) - daily_rf;
    sanitize(excess_mean / downside_dev * TRADING_DAYS.sqrt())
}

/// Maximum drawdown of the cumulative return index, in [0,1].
///
/// Tracks the running peak of Π(1 + rᵢ); drawdown = (peak − current) / peak.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut index = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;

    for r in returns {
        index *= 1.0 + r;
        if index > peak {
            peak = index;
        }
        if peak > 0.0 {
            let dd = (peak - index) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    sanitize(max_dd.clamp(0.0, 1.0))
}

/// Herfindahl-Hirschman concentration index: Σ wᵢ². Equals 1/n for n
/// equal-weighted positions and 1 for a single position.
pub fn herfindahl_index(weights: &[f64]) -> f64 {
    sanitize(weights.iter().map(|w| w * w).sum())
}

/// Combined weight of the k largest positions.
pub fn top_k_weight(weights: &[f64], k: usize) -> f64 {
    let mut sorted: Vec<f64> = weights.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    sanitize(sorted.iter().take(k).sum())
}

/// Regression beta of `returns` against `benchmark` (cov / var). Returns 1.0
/// on degenerate input: mismatched lengths, fewer than two samples, or a
/// flat benchmark.
pub fn beta(returns: &[f64], benchmark: &[f64]) -> f64 {
    if returns.len() != benchmark.len() || returns.len() < 2 {
        return 1.0;
    }
    let mr = mean(returns);
    let mb = mean(benchmark);
    let n = (returns.len() - 1) as f64;

    let cov = returns
        .iter()
        .zip(benchmark)
        .map(|(r, b)| (r - mr) * (b - mb))
        .sum::<f64>()
        / n;
    let var = benchmark.iter().map(|b| (b - mb) * (b - mb)).sum::<f64>() / n;

    if var == 0.0 {
        return 1.0;
    }
    sanitize(cov / var)
}

/// Gross exposure ÷ total portfolio value; 1.0 when the portfolio has no
/// value to lever.
pub fn leverage_ratio(gross_exposure: f64, total_value: f64) -> f64 {
    if total_value <= 0.0 {
        return 1.0;
    }
    sanitize(gross_exposure / total_value)
}

/// Used margin ÷ (used margin + available balance); 0.0 when both are zero.
pub fn margin_utilization(used_margin: f64, available_balance: f64) -> f64 {
    let denom = used_margin + available_balance;
    if denom <= 0.0 {
        return 0.0;
    }
    sanitize(used_margin / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    /// Alternating ±0.01 series has a 0.01 population spread; handy for
    /// volatility scenarios.
    fn alternating_returns(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect()
    }

    #[test]
    fn mean_and_stdev() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[0.02, 0.04]), 0.03);
        assert_eq!(sample_stdev(&[0.01]), 0.0);
        assert!(sample_stdev(&[0.01, 0.01, 0.01]) == 0.0);
    }

    #[test]
    fn annualized_volatility_scenario() {
        // 252 samples with daily stdev ≈ 0.01 ⇒ annualized ≈ 0.1587
        let returns = alternating_returns(252);
        let daily = volatility(&returns);
        assert!(approx(daily, 0.01, 0.0002), "daily vol {daily}");
        let annual = annualized_volatility(&returns);
        assert!(approx(annual, 0.1587, 0.005), "annualized vol {annual}");
    }

    #[test]
    fn var_requires_thirty_observations() {
        let returns = vec![-0.02; 29];
        assert_eq!(historical_var(&returns, 0.05, 1_000_000.0), 0.0);
        assert_eq!(expected_shortfall(&returns, 0.05, 1_000_000.0), 0.0);
    }

    #[test]
    fn var_quantile_indexing() {
        // 100 returns: -0.50, -0.49, ..., +0.49. Sorted ascending already.
        let returns: Vec<f64> = (0..100).map(|i| (i as f64 - 50.0) / 100.0).collect();
        // tail 0.05 ⇒ idx 5 ⇒ return -0.45 ⇒ VaR = 0.45 × value
        let var = historical_var(&returns, 0.05, 100.0);
        assert!(approx(var, 45.0, 1e-9), "var {var}");
        // ES: mean of first six returns (-0.50..-0.45) = -0.475
        let es = expected_shortfall(&returns, 0.05, 100.0);
        assert!(approx(es, 47.5, 1e-9), "es {es}");
        assert!(es >= var);
    }

    #[test]
    fn var_ordering_across_confidence_levels() {
        // Noisy but deterministic series with a fat-ish left tail.
        let returns: Vec<f64> = (0..500)
            .map(|i| {
                let x = (i as f64 * 0.7).sin() * 0.02;
                if i % 97 == 0 {
                    x - 0.05
                } else {
                    x
                }
            })
            .collect();
        let v95 = historical_var(&returns, 0.05, 1.0);
        let v99 = historical_var(&returns, 0.01, 1.0);
        let v999 = historical_var(&returns, 0.001, 1.0);
        assert!(v95 <= v99, "v95={v95} v99={v99}");
        assert!(v99 <= v999, "v99={v99} v999={v999}");
    }

    #[test]
    fn sharpe_zero_volatility_is_zero() {
        let flat = vec![0.001; 40];
        assert_eq!(sharpe_ratio(&flat, DEFAULT_RISK_FREE_RATE), 0.0);
    }

    #[test]
    fn sharpe_positive_for_consistent_gains() {
        let returns = alternating_returns(252)
            .iter()
            .map(|r| r + 0.002)
            .collect::<Vec<_>>();
        assert!(sharpe_ratio(&returns, DEFAULT_RISK_FREE_RATE) > 0.0);
    }

    #[test]
    fn sortino_zero_without_downside() {
        let returns = vec![0.01, 0.02, 0.015, 0.01];
        assert_eq!(sortino_ratio(&returns, DEFAULT_RISK_FREE_RATE), 0.0);
    }

    #[test]
    fn sortino_penalizes_downside_only() {
        let steady = vec![0.002, -0.001, 0.002, -0.001, 0.002, -0.001];
        let volatile_up = vec![0.002, -0.001, 0.05, -0.001, 0.05, -0.001];
        // Extra upside must not reduce the Sortino ratio.
        assert!(
            sortino_ratio(&volatile_up, 0.0) >= sortino_ratio(&steady, 0.0),
            "upside volatility should not be penalized"
        );
    }

    #[test]
    fn drawdown_zero_for_monotonic_series() {
        let returns = vec![0.01, 0.0, 0.02, 0.005, 0.0];
        assert_eq!(max_drawdown(&returns), 0.0);
    }

    #[test]
    fn drawdown_peak_to_trough() {
        // +10% then -10%: peak 1.10, trough 0.99 ⇒ dd = 0.11/1.10 = 0.10
        let returns = vec![0.10, -0.10];
        assert!(approx(max_drawdown(&returns), 0.10, 1e-9));
    }

    #[test]
    fn herfindahl_bounds() {
        assert!(approx(herfindahl_index(&[1.0]), 1.0, 1e-12));
        let equal = vec![0.25; 4];
        assert!(approx(herfindahl_index(&equal), 0.25, 1e-12));
        let n10 = vec![0.1; 10];
        assert!(approx(herfindahl_index(&n10), 0.1, 1e-12));
    }

    #[test]
    fn top_k_weights() {
        let weights = vec![0.4, 0.3, 0.2, 0.1];
        assert!(approx(top_k_weight(&weights, 1), 0.4, 1e-12));
        assert!(approx(top_k_weight(&weights, 5), 1.0, 1e-12));
    }

    #[test]
    fn beta_of_identical_series_is_one() {
        let series = alternating_returns(60);
        assert!(approx(beta(&series, &series), 1.0, 1e-9));
    }

    #[test]
    fn beta_degenerate_input_defaults_to_one() {
        assert_eq!(beta(&[0.01], &[0.01]), 1.0);
        assert_eq!(beta(&[0.01, 0.02], &[0.01]), 1.0);
        assert_eq!(beta(&[0.01, 0.02], &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn leverage_and_margin() {
        assert!(approx(leverage_ratio(200_000.0, 100_000.0), 2.0, 1e-12));
        assert_eq!(leverage_ratio(100.0, 0.0), 1.0);
        assert!(approx(margin_utilization(25_000.0, 75_000.0), 0.25, 1e-12));
        assert_eq!(margin_utilization(0.0, 0.0), 0.0);
    }

    #[test]
    fn sanitize_maps_non_finite() {
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::INFINITY), 0.0);
        assert_eq!(sanitize(1.5), 1.5);
    }

    #[test]
    fn determinism() {
        let returns = alternating_returns(252);
        assert_eq!(
            historical_var(&returns, 0.05, 1_000_000.0),
            historical_var(&returns, 0.05, 1_000_000.0)
        );
        assert_eq!(
            sharpe_ratio(&returns, DEFAULT_RISK_FREE_RATE),
            sharpe_ratio(&returns, DEFAULT_RISK_FREE_RATE)
        );
    }
}
