//! Alert lifecycle manager.
//!
//! Owns the alert state machine (PENDING → ACKNOWLEDGED/ASSIGNED → RESOLVED,
//! with cancellation, expiry, and re-entrant escalation), deduplicates
//! candidates against open alerts and cooldown windows, and emits a typed
//! event after every transition. Delivery of those events is the external
//! notification dispatcher's concern.

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::Sender;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bw_types::alerts::{AlertStatus, AlertSubject, CandidateAlert, RiskAlert};
use bw_types::errors::{AlertError, RiskResult};

use crate::store::{AlertFilter, AlertStore};

/// Outbound message written after every alert transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertEvent {
    Created(Box<RiskAlert>),
    Acknowledged { alert_id: Uuid, by: String },
    Assigned { alert_id: Uuid, to: String, by: String },
    Resolved { alert_id: Uuid, by: String },
    /// Escalation re-notifies with the full alert payload.
    Escalated(Box<RiskAlert>),
    Cancelled { alert_id: Uuid, by: String },
    Expired { alert_id: Uuid },
}

/// Result of submitting a candidate alert.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(RiskAlert),
    /// An open alert for the same (rule, subject) exists inside its cooldown
    /// window; no new alert was created.
    Suppressed { existing: Uuid },
}

/// Per-id result of a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub alert_id: Uuid,
    pub error: Option<String>,
}

impl BulkOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Maximum escalation level; escalating past it fails.
    pub max_escalation_level: u8,
    /// Time-to-live applied to new alerts. `None` = alerts never expire.
    pub default_ttl_seconds: Option<i64>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_escalation_level: 3,
            default_ttl_seconds: Some(7 * 24 * 3600),
        }
    }
}

type DedupKey = (Uuid, AlertSubject);

/// The lifecycle manager. All state lives in the injected store; the manager
/// adds the per-(rule, subject) critical section that makes check-and-create
/// atomic under concurrent candidates.
pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    config: LifecycleConfig,
    events: Sender<AlertEvent>,
    creation_locks: DashMap<DedupKey, Arc<Mutex<()>>>,
}

impl AlertManager {
    pub fn new(store: Arc<dyn AlertStore>, config: LifecycleConfig, events: Sender<AlertEvent>) -> Self {
        Self {
            store,
            config,
            events,
            creation_locks: DashMap::new(),
        }
    }

    /// Submit a candidate. Two concurrent candidates for the same
    /// (rule, subject) key serialize on a per-key lock, so exactly one open
    /// alert can result.
    pub fn create(&self, candidate: CandidateAlert, now: DateTime<Utc>) -> RiskResult<CreateOutcome> {
        let key: DedupKey = (candidate.trigger.rule_id, candidate.subject.clone());
        let lock = self
            .creation_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        if let Some(existing) =
            self.store
                .open_for(candidate.trigger.rule_id, &candidate.subject, now)?
        {
            let cooldown = Duration::seconds(candidate.cooldown_seconds);
            if now - existing.created_at < cooldown {
                debug!(
                    rule_id = %candidate.trigger.rule_id,
                    existing = %existing.id,
                    "candidate suppressed by cooldown"
                );
                return Ok(CreateOutcome::Suppressed { existing: existing.id });
            }
        }

        let ttl = self.config.default_ttl_seconds.map(Duration::seconds);
        let alert = RiskAlert::from_candidate(candidate, now, ttl);
        self.store.insert(alert.clone())?;
        info!(alert_id = %alert.id, severity = ?alert.severity, title = %alert.title, "alert created");
        self.emit(AlertEvent::Created(Box::new(alert.clone())));
        Ok(CreateOutcome::Created(alert))
    }

    /// PENDING → ACKNOWLEDGED.
    pub fn acknowledge(
        &self,
        id: Uuid,
        by: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> RiskResult<RiskAlert> {
        let mut alert = self.load_live(id, now, "acknowledge")?;
        if alert.status != AlertStatus::Pending {
            return Err(self.invalid("acknowledge", &alert));
        }
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(by.to_string());
        alert.acknowledged_at = Some(now);
        alert.acknowledgement_comment = comment;
        alert.updated_at = now;
        self.store.update(alert.clone())?;
        self.emit(AlertEvent::Acknowledged { alert_id: id, by: by.to_string() });
        Ok(alert)
    }

    /// PENDING → ASSIGNED.
    pub fn assign(&self, id: Uuid, to: &str, by: &str, now: DateTime<Utc>) -> RiskResult<RiskAlert> {
        let mut alert = self.load_live(id, now, "assign")?;
        if alert.status != AlertStatus::Pending {
            return Err(self.invalid("assign", &alert));
        }
        alert.status = AlertStatus::Assigned;
        alert.assigned_to = Some(to.to_string());
        alert.assigned_by = Some(by.to_string());
        alert.assigned_at = Some(now);
        alert.updated_at = now;
        self.store.update(alert.clone())?;
        self.emit(AlertEvent::Assigned {
            alert_id: id,
            to: to.to_string(),
            by: by.to_string(),
        });
        Ok(alert)
    }

    /// PENDING/ACKNOWLEDGED/ASSIGNED → RESOLVED. Resolution requires a
    /// resolver identity, free-text detail, and at least one action taken.
    pub fn resolve(
        &self,
        id: Uuid,
        by: &str,
        detail: &str,
        actions: Vec<String>,
        now: DateTime<Utc>,
    ) -> RiskResult<RiskAlert> {
        if by.trim().is_empty() {
            return Err(AlertError::MissingResolution { field: "resolver".into() }.into());
        }
        if detail.trim().is_empty() {
            return Err(AlertError::MissingResolution { field: "detail".into() }.into());
        }
        if actions.is_empty() {
            return Err(AlertError::MissingResolution { field: "actions".into() }.into());
        }

        let mut alert = self.load_live(id, now, "resolve")?;
        if alert.status.is_terminal() {
            return Err(self.invalid("resolve", &alert));
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_by = Some(by.to_string());
        alert.resolved_at = Some(now);
        alert.resolution_detail = Some(detail.to_string());
        alert.resolution_actions = actions;
        alert.updated_at = now;
        self.store.update(alert.clone())?;
        info!(alert_id = %id, by = %by, "alert resolved");
        self.emit(AlertEvent::Resolved { alert_id: id, by: by.to_string() });
        Ok(alert)
    }

    /// Cancel a non-terminal alert. No resolution is recorded.
    pub fn cancel(&self, id: Uuid, by: &str, now: DateTime<Utc>) -> RiskResult<RiskAlert> {
        let mut alert = self.load_live(id, now, "cancel")?;
        if alert.status.is_terminal() {
            return Err(self.invalid("cancel", &alert));
        }
        alert.status = AlertStatus::Cancelled;
        alert.updated_at = now;
        self.store.update(alert.clone())?;
        self.emit(AlertEvent::Cancelled { alert_id: id, by: by.to_string() });
        Ok(alert)
    }

    /// Raise severity and escalation level without changing status.
    /// Re-entrant up to the configured ceiling; re-notifies on every call.
    pub fn escalate(
        &self,
        id: Uuid,
        by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> RiskResult<RiskAlert> {
        let mut alert = self.load_live(id, now, "escalate")?;
        if alert.status.is_terminal() {
            return Err(self.invalid("escalate", &alert));
        }
        if alert.escalation_level >= self.config.max_escalation_level {
            return Err(AlertError::EscalationCeiling {
                alert_id: id,
                level: alert.escalation_level,
            }
            .into());
        }
        alert.escalation_level += 1;
        alert.severity = alert.severity.escalated();
        alert.escalated_by = Some(by.to_string());
        alert.escalation_reason = reason;
        alert.escalated_at = Some(now);
        alert.updated_at = now;
        self.store.update(alert.clone())?;
        warn!(
            alert_id = %id,
            level = alert.escalation_level,
            severity = ?alert.severity,
            "alert escalated"
        );
        self.emit(AlertEvent::Escalated(Box::new(alert.clone())));
        Ok(alert)
    }

    /// Sweep non-terminal alerts past their expiry. Returns the ids expired.
    pub fn expire_due(&self, now: DateTime<Utc>) -> RiskResult<Vec<Uuid>> {
        let mut expired = Vec::new();
        for mut alert in self.store.list(&AlertFilter::default())? {
            if !alert.status.is_terminal() && alert.is_expired(now) {
                alert.status = AlertStatus::Expired;
                alert.updated_at = now;
                let id = alert.id;
                self.store.update(alert)?;
                self.emit(AlertEvent::Expired { alert_id: id });
                expired.push(id);
            }
        }
        Ok(expired)
    }

    pub fn get(&self, id: Uuid) -> RiskResult<RiskAlert> {
        self.store
            .get(id)?
            .ok_or_else(|| AlertError::NotFound { alert_id: id }.into())
    }

    pub fn list(&self, filter: &AlertFilter) -> RiskResult<Vec<RiskAlert>> {
        self.store.list(filter)
    }

    // ---- bulk operations ---------------------------------------------------
    //
    // Each id is processed independently; a failure on one never aborts the
    // others, and there is no ordering guarantee across ids.

    pub fn bulk_acknowledge(
        &self,
        ids: &[Uuid],
        by: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<BulkOutcome> {
        ids.iter()
            .map(|&id| self.outcome(id, self.acknowledge(id, by, comment.clone(), now)))
            .collect()
    }

    pub fn bulk_assign(&self, ids: &[Uuid], to: &str, by: &str, now: DateTime<Utc>) -> Vec<BulkOutcome> {
        ids.iter()
            .map(|&id| self.outcome(id, self.assign(id, to, by, now)))
            .collect()
    }

    pub fn bulk_resolve(
        &self,
        ids: &[Uuid],
        by: &str,
        detail: &str,
        actions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Vec<BulkOutcome> {
        ids.iter()
            .map(|&id| self.outcome(id, self.resolve(id, by, detail, actions.clone(), now)))
            .collect()
    }

    pub fn bulk_escalate(
        &self,
        ids: &[Uuid],
        by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<BulkOutcome> {
        ids.iter()
            .map(|&id| self.outcome(id, self.escalate(id, by, reason.clone(), now)))
            .collect()
    }

    // ---- internal ----------------------------------------------------------

    fn outcome(&self, id: Uuid, result: RiskResult<RiskAlert>) -> BulkOutcome {
        BulkOutcome {
            alert_id: id,
            error: result.err().map(|e| e.to_string()),
        }
    }

    /// Load an alert, lazily expiring it if its TTL has lapsed. Operations on
    /// a just-expired alert fail with InvalidTransition.
    fn load_live(&self, id: Uuid, now: DateTime<Utc>, operation: &str) -> RiskResult<RiskAlert> {
        let mut alert = self.get(id)?;
        if !alert.status.is_terminal() && alert.is_expired(now) {
            alert.status = AlertStatus::Expired;
            alert.updated_at = now;
            self.store.update(alert.clone())?;
            self.emit(AlertEvent::Expired { alert_id: id });
            return Err(AlertError::InvalidTransition {
                operation: operation.to_string(),
                current_state: alert.status.to_string(),
            }
            .into());
        }
        Ok(alert)
    }

    fn invalid(&self, operation: &str, alert: &RiskAlert) -> bw_types::errors::RiskError {
        AlertError::InvalidTransition {
            operation: operation.to_string(),
            current_state: alert.status.to_string(),
        }
        .into()
    }

    fn emit(&self, event: AlertEvent) {
        // Best-effort send; a dropped receiver only loses notifications,
        // never state.
        if self.events.try_send(event).is_err() {
            debug!("alert event receiver unavailable, event dropped");
        }
    }
}
