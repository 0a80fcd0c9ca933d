//! Alerting-rule source port, CRUD store, and rule dry-runs.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use bw_types::alerts::{AlertSubject, AlertingRule, CandidateAlert};
use bw_types::errors::{AlertError, RiskResult};
use bw_types::portfolio::PortfolioRiskMetrics;

use crate::monitor::LimitMonitor;

/// Read port for the rules in scope for a subject, consulted on every
/// evaluation cycle.
pub trait RuleSource: Send + Sync {
    fn rules_for(&self, subject: &AlertSubject) -> RiskResult<Vec<AlertingRule>>;
}

/// In-memory rule store with operator CRUD.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: DashMap<Uuid, AlertingRule>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, assigning a fresh id. Returns the stored rule.
    pub fn create(&self, mut rule: AlertingRule) -> AlertingRule {
        rule.id = Uuid::new_v4();
        self.rules.insert(rule.id, rule.clone());
        rule
    }

    pub fn get(&self, id: Uuid) -> RiskResult<AlertingRule> {
        self.rules
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| AlertError::RuleNotFound { rule_id: id }.into())
    }

    /// Replace an existing rule. The id in `rule` selects the target.
    pub fn update(&self, rule: AlertingRule) -> RiskResult<()> {
        if !self.rules.contains_key(&rule.id) {
            return Err(AlertError::RuleNotFound { rule_id: rule.id }.into());
        }
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> RiskResult<()> {
        self.rules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AlertError::RuleNotFound { rule_id: id }.into())
    }

    pub fn list(&self) -> Vec<AlertingRule> {
        let mut out: Vec<AlertingRule> = self.rules.iter().map(|r| r.clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Dry-run one rule against sample metrics without creating alerts.
    /// Works on inactive rules too, so operators can test before enabling.
    pub fn test_rule(
        &self,
        id: Uuid,
        monitor: &LimitMonitor,
        sample: &PortfolioRiskMetrics,
        subject: &AlertSubject,
        now: DateTime<Utc>,
    ) -> RiskResult<Vec<CandidateAlert>> {
        let mut rule = self.get(id)?;
        rule.active = true;
        Ok(monitor.evaluate_metrics(sample, subject, &[rule], &[], now))
    }
}

impl RuleSource for MemoryRuleStore {
    fn rules_for(&self, subject: &AlertSubject) -> RiskResult<Vec<AlertingRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.active && r.scope.matches(subject))
            .map(|r| r.clone())
            .collect())
    }
}
