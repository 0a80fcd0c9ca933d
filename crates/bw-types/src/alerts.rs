use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Severity of a risk alert, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl AlertSeverity {
    /// The next severity up; escalation saturates at `Critical`.
    pub fn escalated(self) -> Self {
        match self {
            AlertSeverity::Info => AlertSeverity::Warning,
            AlertSeverity::Warning => AlertSeverity::High,
            AlertSeverity::High | AlertSeverity::Critical => AlertSeverity::Critical,
        }
    }
}

/// Operator-facing priority, independent of severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Lifecycle state of an alert.
///
/// Escalation is metadata, not a state: an escalated alert keeps its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertStatus {
    Pending,
    Acknowledged,
    Assigned,
    Resolved,
    Cancelled,
    Expired,
}

impl AlertStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlertStatus::Resolved | AlertStatus::Cancelled | AlertStatus::Expired
        )
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Assigned => "assigned",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// What kind of limit the alert is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    VarBreach,
    DrawdownBreach,
    ConcentrationBreach,
    LeverageBreach,
    MarginBreach,
    VolatilityBreach,
    TradeRiskBreach,
    Custom(String),
}

impl AlertType {
    /// Standing guidance for operators handling this kind of breach.
    pub fn recommended_action(&self) -> &str {
        match self {
            AlertType::VarBreach => {
                "Reduce portfolio leverage and consider hedging strategies"
            }
            AlertType::DrawdownBreach => {
                "Review open positions and tighten stop-losses"
            }
            AlertType::ConcentrationBreach => {
                "Rebalance portfolio to reduce position size"
            }
            AlertType::LeverageBreach => "Deleverage toward the configured limit",
            AlertType::MarginBreach => "Post additional margin or reduce exposure",
            AlertType::VolatilityBreach => "Increase allocation to liquid assets",
            AlertType::TradeRiskBreach => "Review the flagged trade before execution",
            AlertType::Custom(_) => "Review portfolio and consult risk manager",
        }
    }
}

/// Who or what an alert is about. Together with the rule id this forms the
/// deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AlertSubject {
    pub portfolio_id: Option<String>,
    pub account_id: Option<String>,
    pub user_id: Option<String>,
    pub trade_id: Option<String>,
}

impl AlertSubject {
    pub fn portfolio(id: impl Into<String>) -> Self {
        Self {
            portfolio_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn account(id: impl Into<String>) -> Self {
        Self {
            account_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// Snapshot of the rule evaluation that triggered an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    pub rule_id: Uuid,
    pub field: String,
    pub operator: ConditionOperator,
    pub threshold: f64,
    pub actual: f64,
    pub window_seconds: Option<i64>,
}

/// Estimated blast radius of the condition behind an alert.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub financial_impact: Option<Decimal>,
    pub risk_exposure: Option<Decimal>,
    pub affected_positions: Vec<String>,
    pub potential_loss: Option<Decimal>,
    pub estimated_resolution_minutes: Option<u32>,
}

/// Channels an alert should be dispatched on. Delivery is external.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    Webhook,
}

/// Comparison operator in a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Contains,
    NotContains,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionOperator::Gt => ">",
            ConditionOperator::Ge => ">=",
            ConditionOperator::Lt => "<",
            ConditionOperator::Le => "<=",
            ConditionOperator::Eq => "=",
            ConditionOperator::Ne => "!=",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not-contains",
        };
        write!(f, "{}", s)
    }
}

/// How a windowed condition folds history before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Aggregation {
    /// Compare the current value only; history is ignored.
    #[default]
    Latest,
    Avg,
    Min,
    Max,
}

/// How multiple conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineOp {
    /// Every condition must hold (AND).
    #[default]
    All,
    /// At least one condition must hold (OR).
    Any,
}

/// One comparison inside an alerting rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Field name resolved against the metrics bundle or assessment.
    pub field: String,
    pub operator: ConditionOperator,
    pub threshold: f64,
    /// Text needle for `Contains`/`NotContains` operators.
    pub text: Option<String>,
    pub aggregation: Aggregation,
    pub window_seconds: Option<i64>,
}

/// What the rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleScope {
    Portfolio(String),
    Account(String),
    Global,
}

impl RuleScope {
    /// Whether a rule in this scope applies to the given subject.
    pub fn matches(&self, subject: &AlertSubject) -> bool {
        match self {
            RuleScope::Global => true,
            RuleScope::Portfolio(id) => subject.portfolio_id.as_deref() == Some(id),
            RuleScope::Account(id) => subject.account_id.as_deref() == Some(id),
        }
    }
}

/// Operator-configured alerting rule, read on every evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertingRule {
    pub id: Uuid,
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    pub combine: CombineOp,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub priority: AlertPriority,
    pub channels: Vec<NotificationChannel>,
    pub cooldown_seconds: i64,
    pub active: bool,
    pub scope: RuleScope,
}

impl AlertingRule {
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_seconds)
    }
}

/// A rule match emitted by the limit monitor. Not yet an alert: the
/// lifecycle manager decides whether it survives deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAlert {
    pub subject: AlertSubject,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub priority: AlertPriority,
    pub title: String,
    pub description: String,
    pub trigger: TriggerSnapshot,
    pub channels: Vec<NotificationChannel>,
    pub cooldown_seconds: i64,
    pub context: HashMap<String, String>,
    pub impact: ImpactAssessment,
}

/// A lifecycle-managed risk alert.
///
/// Created from a candidate by the lifecycle manager; mutated only through
/// its operations; never deleted, only transitioned to a terminal state or
/// allowed to expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub subject: AlertSubject,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub priority: AlertPriority,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    pub trigger: TriggerSnapshot,
    pub context: HashMap<String, String>,
    pub recommended_actions: Vec<String>,
    pub impact: ImpactAssessment,
    pub related_alerts: Vec<Uuid>,
    pub channels: Vec<NotificationChannel>,

    // --- lifecycle metadata ---
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledgement_comment: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_by: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_detail: Option<String>,
    pub resolution_actions: Vec<String>,
    pub escalation_level: u8,
    pub escalated_by: Option<String>,
    pub escalation_reason: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,

    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RiskAlert {
    /// Build a fresh PENDING alert from a candidate.
    pub fn from_candidate(candidate: CandidateAlert, now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        let recommended = vec![candidate.alert_type.recommended_action().to_string()];
        Self {
            id: Uuid::new_v4(),
            subject: candidate.subject,
            alert_type: candidate.alert_type,
            severity: candidate.severity,
            priority: candidate.priority,
            status: AlertStatus::Pending,
            title: candidate.title,
            description: candidate.description,
            trigger: candidate.trigger,
            context: candidate.context,
            recommended_actions: recommended,
            impact: candidate.impact,
            related_alerts: Vec::new(),
            channels: candidate.channels,
            acknowledged_by: None,
            acknowledged_at: None,
            acknowledgement_comment: None,
            assigned_to: None,
            assigned_by: None,
            assigned_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_detail: None,
            resolution_actions: Vec::new(),
            escalation_level: 0,
            escalated_by: None,
            escalation_reason: None,
            escalated_at: None,
            expires_at: ttl.map(|d| now + d),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the alert is past its expiry timestamp.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}
