use thiserror::Error;
use uuid::Uuid;

/// Main error type for the Bulwark risk engine
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient data: {required} observations required, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Computation error in {metric}: {message}")]
    Computation { metric: String, message: String },

    #[error("Upstream unavailable: {source_name}: {message}")]
    UpstreamUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Portfolio not found: {portfolio_id}")]
    PortfolioNotFound { portfolio_id: String },

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Alert lifecycle errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alert not found: {alert_id}")]
    NotFound { alert_id: Uuid },

    #[error("Invalid transition: cannot {operation} an alert in state {current_state}")]
    InvalidTransition {
        operation: String,
        current_state: String,
    },

    #[error("Alerting rule not found: {rule_id}")]
    RuleNotFound { rule_id: Uuid },

    #[error("Escalation ceiling reached: alert {alert_id} is already at level {level}")]
    EscalationCeiling { alert_id: Uuid, level: u8 },

    #[error("Missing resolution detail: {field}")]
    MissingResolution { field: String },
}

/// Result type alias for Bulwark operations
pub type RiskResult<T> = Result<T, RiskError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::errors::RiskError::Validation(format!($($arg)*))
    };
}
