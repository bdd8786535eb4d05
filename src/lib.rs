//! Fundwatch
//!
//! Polls exchange-traded fund quotes, applies per-instrument gap-open and
//! intraday escalation rules, and pushes one aggregated alert message per
//! cycle to a group webhook.

pub mod config;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod scrapers;
pub mod signals;

pub use config::{MonitorConfig, Overrides, RuleSet};
pub use models::{Direction, InstrumentClass, MonitoringRule, Quote};
pub use monitor::{CycleReport, Delivery, Monitor};
