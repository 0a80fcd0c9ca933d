//! Risk limit monitoring and alert lifecycle management for Bulwark.
//!
//! Provides:
//! - Stateless rule evaluation over metric bundles and trade assessments
//! - Built-in default thresholds when no explicit rule is configured
//! - The alert state machine with deduplication, cooldown, and escalation
//! - In-memory rule/alert stores behind storage ports

pub mod lifecycle;
pub mod monitor;
pub mod rules;
pub mod store;

pub use lifecycle::{AlertEvent, AlertManager, BulkOutcome, CreateOutcome, LifecycleConfig};
pub use monitor::{LimitMonitor, MonitorConfig};
pub use rules::{MemoryRuleStore, RuleSource};
pub use store::{AlertFilter, AlertStore, MemoryAlertStore};
