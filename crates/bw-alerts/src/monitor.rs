//! Risk limit monitor — a stateless comparison pass.
//!
//! Given a metrics bundle or a trade assessment plus the alerting rules in
//! scope, [`LimitMonitor`] evaluates every rule's conditions and emits a
//! candidate alert for each satisfied rule. It creates nothing itself: the
//! lifecycle manager decides whether a candidate survives deduplication.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use bw_types::alerts::{
    Aggregation, AlertPriority, AlertSeverity, AlertSubject, AlertType, AlertingRule,
    CandidateAlert, CombineOp, ConditionOperator, ImpactAssessment, NotificationChannel,
    RuleCondition, RuleScope, TriggerSnapshot,
};
use bw_types::portfolio::PortfolioRiskMetrics;
use bw_types::trade::RiskAssessmentResult;

// Stable ids for the built-in rules so deduplication keys survive across
// evaluation cycles.
const DEFAULT_VAR_RULE: Uuid = Uuid::from_u128(0xb01d_0001);
const DEFAULT_CONCENTRATION_RULE: Uuid = Uuid::from_u128(0xb01d_0002);
const DEFAULT_DRAWDOWN_RULE: Uuid = Uuid::from_u128(0xb01d_0003);
const DEFAULT_LEVERAGE_RULE: Uuid = Uuid::from_u128(0xb01d_0004);

/// Built-in thresholds applied when no explicit rule exists for a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// VaR(95%) as a fraction of portfolio value.
    pub var_95_limit: f64,
    /// Largest single position weight.
    pub top_position_limit: f64,
    pub max_drawdown_limit: f64,
    pub leverage_limit: f64,
    /// Cooldown applied to the built-in rules.
    pub default_cooldown_seconds: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            var_95_limit: 0.05,
            top_position_limit: 0.25,
            max_drawdown_limit: 0.15,
            leverage_limit: 5.0,
            default_cooldown_seconds: 3600,
        }
    }
}

/// A resolved condition input: numeric metric or text haystack.
enum FieldValue {
    Num(f64),
    Text(String),
}

/// Stateless rule evaluator.
pub struct LimitMonitor {
    config: MonitorConfig,
}

impl LimitMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    /// The built-in default rule set, used when the rule source yields no
    /// explicit rules for the subject.
    pub fn default_rules(&self) -> Vec<AlertingRule> {
        let cooldown = self.config.default_cooldown_seconds;
        vec![
            AlertingRule {
                id: DEFAULT_VAR_RULE,
                name: "VaR(95%) above 5% of portfolio value".into(),
                conditions: vec![numeric_condition("var_95_pct", ConditionOperator::Gt, self.config.var_95_limit)],
                combine: CombineOp::All,
                alert_type: AlertType::VarBreach,
                severity: AlertSeverity::High,
                priority: AlertPriority::High,
                channels: vec![NotificationChannel::Email],
                cooldown_seconds: cooldown,
                active: true,
                scope: RuleScope::Global,
            },
            AlertingRule {
                id: DEFAULT_CONCENTRATION_RULE,
                name: "Top position above 25% of portfolio".into(),
                conditions: vec![numeric_condition(
                    "top_position_weight",
                    ConditionOperator::Gt,
                    self.config.top_position_limit,
                )],
                combine: CombineOp::All,
                alert_type: AlertType::ConcentrationBreach,
                severity: AlertSeverity::Warning,
                priority: AlertPriority::Medium,
                channels: vec![NotificationChannel::Email],
                cooldown_seconds: cooldown,
                active: true,
                scope: RuleScope::Global,
            },
            AlertingRule {
                id: DEFAULT_DRAWDOWN_RULE,
                name: "Max drawdown above 15%".into(),
                conditions: vec![numeric_condition(
                    "max_drawdown",
                    ConditionOperator::Gt,
                    self.config.max_drawdown_limit,
                )],
                combine: CombineOp::All,
                alert_type: AlertType::DrawdownBreach,
                severity: AlertSeverity::High,
                priority: AlertPriority::High,
                channels: vec![NotificationChannel::Email],
                cooldown_seconds: cooldown,
                active: true,
                scope: RuleScope::Global,
            },
            AlertingRule {
                id: DEFAULT_LEVERAGE_RULE,
                name: "Leverage above 5x".into(),
                conditions: vec![numeric_condition(
                    "leverage_ratio",
                    ConditionOperator::Gt,
                    self.config.leverage_limit,
                )],
                combine: CombineOp::All,
                alert_type: AlertType::LeverageBreach,
                severity: AlertSeverity::Critical,
                priority: AlertPriority::Urgent,
                channels: vec![NotificationChannel::Email],
                cooldown_seconds: cooldown,
                active: true,
                scope: RuleScope::Global,
            },
        ]
    }

    /// Evaluate rules against a portfolio metrics bundle.
    ///
    /// `history` is the time-ordered series of previously published bundles
    /// for this portfolio; windowed aggregations fold over it. When `rules`
    /// is empty, the built-in defaults apply.
    pub fn evaluate_metrics(
        &self,
        metrics: &PortfolioRiskMetrics,
        subject: &AlertSubject,
        rules: &[AlertingRule],
        history: &[PortfolioRiskMetrics],
        now: DateTime<Utc>,
    ) -> Vec<CandidateAlert> {
        let defaults;
        let effective: &[AlertingRule] = if rules.is_empty() {
            defaults = self.default_rules();
            &defaults
        } else {
            rules
        };

        let mut candidates = Vec::new();
        for rule in effective {
            if !rule.active || !rule.scope.matches(subject) {
                continue;
            }
            let resolve = |cond: &RuleCondition| {
                resolve_metric_field(metrics, history, cond, now)
            };
            if let Some(trigger) = evaluate_rule(rule, resolve) {
                debug!(rule = %rule.name, field = %trigger.field, actual = trigger.actual, "rule satisfied");
                candidates.push(self.candidate_from_metrics(rule, trigger, metrics, subject));
            }
        }
        candidates
    }

    /// Evaluate rules against a single trade assessment. No history applies:
    /// an assessment exists only for the request that produced it.
    pub fn evaluate_assessment(
        &self,
        assessment: &RiskAssessmentResult,
        subject: &AlertSubject,
        rules: &[AlertingRule],
        _now: DateTime<Utc>,
    ) -> Vec<CandidateAlert> {
        let mut candidates = Vec::new();
        for rule in rules {
            if !rule.active || !rule.scope.matches(subject) {
                continue;
            }
            let resolve = |cond: &RuleCondition| resolve_assessment_field(assessment, cond);
            if let Some(trigger) = evaluate_rule(rule, resolve) {
                candidates.push(CandidateAlert {
                    subject: subject.clone(),
                    alert_type: rule.alert_type.clone(),
                    severity: rule.severity,
                    priority: rule.priority,
                    title: rule.name.clone(),
                    description: format!(
                        "{} {} {} (actual {:.4}, score {:.1})",
                        trigger.field, trigger.operator, trigger.threshold, trigger.actual,
                        assessment.score
                    ),
                    trigger,
                    channels: rule.channels.clone(),
                    cooldown_seconds: rule.cooldown_seconds,
                    context: HashMap::from([
                        ("score".to_string(), format!("{:.2}", assessment.score)),
                        ("level".to_string(), assessment.level.to_string()),
                    ]),
                    impact: ImpactAssessment::default(),
                });
            }
        }
        candidates
    }

    fn candidate_from_metrics(
        &self,
        rule: &AlertingRule,
        trigger: TriggerSnapshot,
        metrics: &PortfolioRiskMetrics,
        subject: &AlertSubject,
    ) -> CandidateAlert {
        let mut context = HashMap::new();
        context.insert("portfolio_id".to_string(), metrics.portfolio_id.clone());
        context.insert(trigger.field.clone(), format!("{:.6}", trigger.actual));

        let impact = ImpactAssessment {
            financial_impact: None,
            risk_exposure: Some(metrics.total_value),
            affected_positions: Vec::new(),
            potential_loss: Some(metrics.var_95),
            estimated_resolution_minutes: None,
        };

        CandidateAlert {
            subject: subject.clone(),
            alert_type: rule.alert_type.clone(),
            severity: rule.severity,
            priority: rule.priority,
            title: rule.name.clone(),
            description: format!(
                "{} {} {} (actual {:.4})",
                trigger.field, trigger.operator, trigger.threshold, trigger.actual
            ),
            trigger,
            channels: rule.channels.clone(),
            cooldown_seconds: rule.cooldown_seconds,
            context,
            impact,
        }
    }
}

impl Default for LimitMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

fn numeric_condition(field: &str, operator: ConditionOperator, threshold: f64) -> RuleCondition {
    RuleCondition {
        field: field.into(),
        operator,
        threshold,
        text: None,
        aggregation: Aggregation::Latest,
        window_seconds: None,
    }
}

/// Evaluate one rule; returns the trigger snapshot of the deciding condition
/// when the combined condition holds.
fn evaluate_rule<F>(rule: &AlertingRule, resolve: F) -> Option<TriggerSnapshot>
where
    F: Fn(&RuleCondition) -> Option<FieldValue>,
{
    let mut first_hit: Option<TriggerSnapshot> = None;
    let mut all = true;
    let mut any = false;

    for cond in &rule.conditions {
        let satisfied = match resolve(cond) {
            Some(FieldValue::Num(actual)) => {
                let hit = compare_numeric(cond.operator, actual, cond.threshold);
                if hit && first_hit.is_none() {
                    first_hit = Some(trigger_for(rule.id, cond, actual));
                }
                hit
            }
            Some(FieldValue::Text(haystack)) => {
                let hit = compare_text(cond.operator, &haystack, cond.text.as_deref());
                if hit && first_hit.is_none() {
                    first_hit = Some(trigger_for(rule.id, cond, 1.0));
                }
                hit
            }
            // Missing data never satisfies a condition.
            None => false,
        };
        all &= satisfied;
        any |= satisfied;
    }

    let combined = match rule.combine {
        CombineOp::All => all && !rule.conditions.is_empty(),
        CombineOp::Any => any,
    };
    if combined {
        first_hit
    } else {
        None
    }
}

fn trigger_for(rule_id: Uuid, cond: &RuleCondition, actual: f64) -> TriggerSnapshot {
    TriggerSnapshot {
        rule_id,
        field: cond.field.clone(),
        operator: cond.operator,
        threshold: cond.threshold,
        actual,
        window_seconds: cond.window_seconds,
    }
}

fn compare_numeric(op: ConditionOperator, actual: f64, threshold: f64) -> bool {
    match op {
        ConditionOperator::Gt => actual > threshold,
        ConditionOperator::Ge => actual >= threshold,
        ConditionOperator::Lt => actual < threshold,
        ConditionOperator::Le => actual <= threshold,
        ConditionOperator::Eq => actual == threshold,
        ConditionOperator::Ne => actual != threshold,
        ConditionOperator::Contains | ConditionOperator::NotContains => false,
    }
}

fn compare_text(op: ConditionOperator, haystack: &str, needle: Option<&str>) -> bool {
    let Some(needle) = needle else { return false };
    match op {
        ConditionOperator::Contains => haystack.contains(needle),
        ConditionOperator::NotContains => !haystack.contains(needle),
        _ => false,
    }
}

fn resolve_metric_field(
    metrics: &PortfolioRiskMetrics,
    history: &[PortfolioRiskMetrics],
    cond: &RuleCondition,
    now: DateTime<Utc>,
) -> Option<FieldValue> {
    let current = metrics.field(&cond.field)?;
    let value = match cond.aggregation {
        Aggregation::Latest => current,
        agg => {
            let cutoff = cond
                .window_seconds
                .map(|s| now - Duration::seconds(s));
            let mut values: Vec<f64> = history
                .iter()
                .filter(|m| cutoff.map(|c| m.as_of >= c).unwrap_or(true))
                .filter_map(|m| m.field(&cond.field))
                .collect();
            values.push(current);
            match agg {
                Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
                Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                Aggregation::Latest => current,
            }
        }
    };
    Some(FieldValue::Num(value))
}

fn resolve_assessment_field(
    assessment: &RiskAssessmentResult,
    cond: &RuleCondition,
) -> Option<FieldValue> {
    match cond.field.as_str() {
        "score" => Some(FieldValue::Num(assessment.score)),
        "risk_reward_ratio" => assessment.risk_reward_ratio.map(FieldValue::Num),
        "warnings" => Some(FieldValue::Text(assessment.warnings.join("; "))),
        "factors" => Some(FieldValue::Text(
            assessment
                .factors
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )),
        name => {
            // Per-factor contribution lookup, e.g. "factor:leverage".
            let factor_name = name.strip_prefix("factor:")?;
            assessment
                .factors
                .iter()
                .find(|f| f.name == factor_name)
                .map(|f| FieldValue::Num(f.contribution))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_types::portfolio::PortfolioRiskMetrics;
    use bw_types::trade::{RiskFactor, RiskLevel};
    use rust_decimal_macros::dec;

    fn metrics(leverage: f64, drawdown: f64) -> PortfolioRiskMetrics {
        let mut m = PortfolioRiskMetrics::empty("p1", Utc::now());
        m.total_value = dec!(1_000_000);
        m.leverage_ratio = leverage;
        m.max_drawdown = drawdown;
        m
    }

    fn subject() -> AlertSubject {
        AlertSubject::portfolio("p1")
    }

    #[test]
    fn no_candidates_inside_limits() {
        let monitor = LimitMonitor::default();
        let out = monitor.evaluate_metrics(&metrics(1.0, 0.02), &subject(), &[], &[], Utc::now());
        assert!(out.is_empty());
    }

    #[test]
    fn default_leverage_rule_fires() {
        let monitor = LimitMonitor::default();
        let out = monitor.evaluate_metrics(&metrics(6.0, 0.0), &subject(), &[], &[], Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].alert_type, AlertType::LeverageBreach);
        assert_eq!(out[0].trigger.actual, 6.0);
    }

    #[test]
    fn default_var_rule_uses_fraction_of_value() {
        let monitor = LimitMonitor::default();
        let mut m = metrics(1.0, 0.0);
        m.var_95 = dec!(60_000); // 6% of 1M > 5% limit
        let out = monitor.evaluate_metrics(&m, &subject(), &[], &[], Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].alert_type, AlertType::VarBreach);
    }

    #[test]
    fn default_drawdown_rule_fires_above_fifteen_percent() {
        let monitor = LimitMonitor::default();
        let out = monitor.evaluate_metrics(&metrics(1.0, 0.20), &subject(), &[], &[], Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].alert_type, AlertType::DrawdownBreach);
    }

    fn explicit_rule(conditions: Vec<RuleCondition>, combine: CombineOp) -> AlertingRule {
        AlertingRule {
            id: Uuid::new_v4(),
            name: "custom".into(),
            conditions,
            combine,
            alert_type: AlertType::Custom("custom".into()),
            severity: AlertSeverity::Warning,
            priority: AlertPriority::Low,
            channels: Vec::new(),
            cooldown_seconds: 60,
            active: true,
            scope: RuleScope::Global,
        }
    }

    #[test]
    fn explicit_rules_replace_defaults() {
        let monitor = LimitMonitor::default();
        // Leverage 6 would trip the default rule, but the explicit set wins.
        let rule = explicit_rule(
            vec![numeric_condition("max_drawdown", ConditionOperator::Gt, 0.5)],
            CombineOp::All,
        );
        let out = monitor.evaluate_metrics(&metrics(6.0, 0.0), &subject(), &[rule], &[], Utc::now());
        assert!(out.is_empty());
    }

    #[test]
    fn and_requires_all_conditions() {
        let monitor = LimitMonitor::default();
        let rule = explicit_rule(
            vec![
                numeric_condition("leverage_ratio", ConditionOperator::Gt, 2.0),
                numeric_condition("max_drawdown", ConditionOperator::Gt, 0.10),
            ],
            CombineOp::All,
        );
        let none = monitor.evaluate_metrics(
            &metrics(3.0, 0.05),
            &subject(),
            std::slice::from_ref(&rule),
            &[],
            Utc::now(),
        );
        assert!(none.is_empty());

        let both = monitor.evaluate_metrics(&metrics(3.0, 0.12), &subject(), &[rule], &[], Utc::now());
        assert_eq!(both.len(), 1);
    }

    #[test]
    fn or_requires_any_condition() {
        let monitor = LimitMonitor::default();
        let rule = explicit_rule(
            vec![
                numeric_condition("leverage_ratio", ConditionOperator::Gt, 10.0),
                numeric_condition("max_drawdown", ConditionOperator::Ge, 0.10),
            ],
            CombineOp::Any,
        );
        let out = monitor.evaluate_metrics(&metrics(1.0, 0.10), &subject(), &[rule], &[], Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trigger.field, "max_drawdown");
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let monitor = LimitMonitor::default();
        let mut rule = explicit_rule(
            vec![numeric_condition("leverage_ratio", ConditionOperator::Gt, 1.0)],
            CombineOp::All,
        );
        rule.active = false;
        let out = monitor.evaluate_metrics(&metrics(5.0, 0.0), &subject(), &[rule], &[], Utc::now());
        assert!(out.is_empty());
    }

    #[test]
    fn scoped_rule_skips_other_portfolio() {
        let monitor = LimitMonitor::default();
        let mut rule = explicit_rule(
            vec![numeric_condition("leverage_ratio", ConditionOperator::Gt, 1.0)],
            CombineOp::All,
        );
        rule.scope = RuleScope::Portfolio("other".into());
        let out = monitor.evaluate_metrics(&metrics(5.0, 0.0), &subject(), &[rule], &[], Utc::now());
        assert!(out.is_empty());
    }

    #[test]
    fn windowed_average_aggregation() {
        let monitor = LimitMonitor::default();
        let now = Utc::now();

        let mut rule = explicit_rule(
            vec![RuleCondition {
                field: "leverage_ratio".into(),
                operator: ConditionOperator::Gt,
                threshold: 3.0,
                text: None,
                aggregation: Aggregation::Avg,
                window_seconds: Some(7200),
            }],
            CombineOp::All,
        );
        rule.name = "avg leverage".into();

        // Two in-window history points at 2.0 and a current value of 8.0:
        // average 4.0 > 3.0.
        let mut h1 = metrics(2.0, 0.0);
        h1.as_of = now - Duration::seconds(3000);
        let mut h2 = metrics(2.0, 0.0);
        h2.as_of = now - Duration::seconds(1500);
        // An out-of-window spike must be ignored.
        let mut old = metrics(50.0, 0.0);
        old.as_of = now - Duration::seconds(100_000);

        let current = metrics(8.0, 0.0);
        let out = monitor.evaluate_metrics(
            &current,
            &subject(),
            std::slice::from_ref(&rule),
            &[old.clone(), h1.clone(), h2.clone()],
            now,
        );
        assert_eq!(out.len(), 1);
        assert!((out[0].trigger.actual - 4.0).abs() < 1e-9);

        // With only the in-window history and a calm current value the
        // average stays below the threshold.
        let calm = metrics(1.0, 0.0);
        let out = monitor.evaluate_metrics(&calm, &subject(), &[rule], &[h1, h2], now);
        assert!(out.is_empty());
    }

    #[test]
    fn assessment_rules_match_on_score_and_warnings() {
        let monitor = LimitMonitor::default();
        let assessment = RiskAssessmentResult {
            level: RiskLevel::High,
            score: 65.0,
            factors: vec![RiskFactor {
                name: "leverage".into(),
                value: 12.0,
                weight: 0.2,
                contribution: 20.0,
                description: "12x leverage".into(),
            }],
            recommendations: Vec::new(),
            warnings: vec!["no stop-loss set".into()],
            approved: false,
            suggested_max_position: None,
            suggested_stop_loss: None,
            risk_reward_ratio: None,
        };

        let score_rule = explicit_rule(
            vec![numeric_condition("score", ConditionOperator::Ge, 60.0)],
            CombineOp::All,
        );
        let text_rule = explicit_rule(
            vec![RuleCondition {
                field: "warnings".into(),
                operator: ConditionOperator::Contains,
                threshold: 0.0,
                text: Some("stop-loss".into()),
                aggregation: Aggregation::Latest,
                window_seconds: None,
            }],
            CombineOp::All,
        );
        let factor_rule = explicit_rule(
            vec![numeric_condition("factor:leverage", ConditionOperator::Gt, 15.0)],
            CombineOp::All,
        );

        let out = monitor.evaluate_assessment(
            &assessment,
            &subject(),
            &[score_rule, text_rule, factor_rule],
            Utc::now(),
        );
        assert_eq!(out.len(), 3);
    }
}
