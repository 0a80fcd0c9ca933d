//! Alert persistence port and the in-memory reference implementation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use bw_types::alerts::{
    AlertPriority, AlertSeverity, AlertStatus, AlertSubject, AlertType, RiskAlert,
};
use bw_types::errors::{AlertError, RiskResult};

/// Filter for alert listings. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub subject: Option<AlertSubject>,
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub priority: Option<AlertPriority>,
    pub status: Option<AlertStatus>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &RiskAlert) -> bool {
        if let Some(subject) = &self.subject {
            if &alert.subject != subject {
                return false;
            }
        }
        if let Some(alert_type) = &self.alert_type {
            if &alert.alert_type != alert_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if alert.severity != severity {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if alert.priority != priority {
                return false;
            }
        }
        if let Some(status) = self.status {
            if alert.status != status {
                return false;
            }
        }
        true
    }
}

/// Storage port for alerts. The engine only needs read access to currently
/// open alerts (for deduplication) plus basic insert/update/list; durable
/// persistence lives behind this boundary.
pub trait AlertStore: Send + Sync {
    fn insert(&self, alert: RiskAlert) -> RiskResult<()>;
    fn get(&self, id: Uuid) -> RiskResult<Option<RiskAlert>>;
    fn update(&self, alert: RiskAlert) -> RiskResult<()>;
    fn list(&self, filter: &AlertFilter) -> RiskResult<Vec<RiskAlert>>;
    /// Most recent non-terminal alert for a (rule, subject) pair, if any.
    fn open_for(
        &self,
        rule_id: Uuid,
        subject: &AlertSubject,
        now: DateTime<Utc>,
    ) -> RiskResult<Option<RiskAlert>>;
}

/// In-memory alert store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: DashMap<Uuid, RiskAlert>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl AlertStore for MemoryAlertStore {
    fn insert(&self, alert: RiskAlert) -> RiskResult<()> {
        self.alerts.insert(alert.id, alert);
        Ok(())
    }

    fn get(&self, id: Uuid) -> RiskResult<Option<RiskAlert>> {
        Ok(self.alerts.get(&id).map(|a| a.clone()))
    }

    fn update(&self, alert: RiskAlert) -> RiskResult<()> {
        if !self.alerts.contains_key(&alert.id) {
            return Err(AlertError::NotFound { alert_id: alert.id }.into());
        }
        self.alerts.insert(alert.id, alert);
        Ok(())
    }

    fn list(&self, filter: &AlertFilter) -> RiskResult<Vec<RiskAlert>> {
        let mut out: Vec<RiskAlert> = self
            .alerts
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn open_for(
        &self,
        rule_id: Uuid,
        subject: &AlertSubject,
        now: DateTime<Utc>,
    ) -> RiskResult<Option<RiskAlert>> {
        let mut newest: Option<RiskAlert> = None;
        for entry in self.alerts.iter() {
            let alert = entry.value();
            if alert.trigger.rule_id != rule_id || &alert.subject != subject {
                continue;
            }
            if alert.status.is_terminal() || alert.is_expired(now) {
                continue;
            }
            match &newest {
                Some(current) if current.created_at >= alert.created_at => {}
                _ => newest = Some(alert.clone()),
            }
        }
        Ok(newest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_types::alerts::{CandidateAlert, ConditionOperator, ImpactAssessment, TriggerSnapshot};
    use std::collections::HashMap;

    fn make_alert(rule_id: Uuid, subject: AlertSubject, now: DateTime<Utc>) -> RiskAlert {
        let candidate = CandidateAlert {
            subject,
            alert_type: AlertType::LeverageBreach,
            severity: AlertSeverity::Warning,
            priority: AlertPriority::Medium,
            title: "leverage".into(),
            description: "leverage above limit".into(),
            trigger: TriggerSnapshot {
                rule_id,
                field: "leverage_ratio".into(),
                operator: ConditionOperator::Gt,
                threshold: 5.0,
                actual: 6.2,
                window_seconds: None,
            },
            channels: Vec::new(),
            cooldown_seconds: 600,
            context: HashMap::new(),
            impact: ImpactAssessment::default(),
        };
        RiskAlert::from_candidate(candidate, now, None)
    }

    #[test]
    fn insert_get_roundtrip() {
        let store = MemoryAlertStore::new();
        let now = Utc::now();
        let alert = make_alert(Uuid::new_v4(), AlertSubject::portfolio("p1"), now);
        let id = alert.id;
        store.insert(alert).unwrap();
        assert!(store.get(id).unwrap().is_some());
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn update_unknown_alert_fails() {
        let store = MemoryAlertStore::new();
        let alert = make_alert(Uuid::new_v4(), AlertSubject::portfolio("p1"), Utc::now());
        assert!(store.update(alert).is_err());
    }

    #[test]
    fn open_for_ignores_terminal_alerts() {
        let store = MemoryAlertStore::new();
        let now = Utc::now();
        let rule_id = Uuid::new_v4();
        let subject = AlertSubject::portfolio("p1");

        let mut alert = make_alert(rule_id, subject.clone(), now);
        alert.status = AlertStatus::Resolved;
        store.insert(alert).unwrap();
        assert!(store.open_for(rule_id, &subject, now).unwrap().is_none());

        let open = make_alert(rule_id, subject.clone(), now);
        let open_id = open.id;
        store.insert(open).unwrap();
        assert_eq!(
            store.open_for(rule_id, &subject, now).unwrap().unwrap().id,
            open_id
        );
    }

    #[test]
    fn open_for_distinguishes_subjects() {
        let store = MemoryAlertStore::new();
        let now = Utc::now();
        let rule_id = Uuid::new_v4();
        store
            .insert(make_alert(rule_id, AlertSubject::portfolio("p1"), now))
            .unwrap();
        assert!(store
            .open_for(rule_id, &AlertSubject::portfolio("p2"), now)
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_filters_by_status() {
        let store = MemoryAlertStore::new();
        let now = Utc::now();
        let mut resolved = make_alert(Uuid::new_v4(), AlertSubject::portfolio("p1"), now);
        resolved.status = AlertStatus::Resolved;
        store.insert(resolved).unwrap();
        store
            .insert(make_alert(Uuid::new_v4(), AlertSubject::portfolio("p1"), now))
            .unwrap();

        let pending = store
            .list(&AlertFilter {
                status: Some(AlertStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);

        let all = store.list(&AlertFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
    }
}
