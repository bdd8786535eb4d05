//! Monitor configuration
//!
//! Settings come from an optional TOML file, then command-line flags (which
//! also read from the environment) override individual values.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{InstrumentClass, MonitoringRule};
use crate::notify::wecom::WECOM_WEBHOOK_URL;
use crate::scrapers::sina::SINA_QUOTES_URL;
use crate::signals::ladder::{DEFAULT_LADDER_LEN, MAX_LADDER_LEN};

/// Why one rule entry was not loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("rule {entry:?}: expected code-up-down, found {fields} field(s)")]
    FieldCount { entry: String, fields: usize },
    #[error("rule {entry:?}: instrument code is empty")]
    EmptyCode { entry: String },
    #[error("rule {entry:?}: {side} threshold {value:?} is not a number")]
    InvalidThreshold {
        entry: String,
        side: &'static str,
        value: String,
    },
    #[error("rule {entry:?}: {side} threshold must be greater than zero")]
    NonPositiveThreshold { entry: String, side: &'static str },
    #[error("rule {entry:?}: code {code} is already configured")]
    DuplicateCode { entry: String, code: String },
}

/// Outcome of loading the rule list: what loaded and what was rejected.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<MonitoringRule>,
    pub rejected: Vec<RuleError>,
}

/// Parse `code-up-down` entries separated by commas, semicolons or newlines.
///
/// Malformed entries are collected in `rejected`; the rest still load.
pub fn parse_rules(text: &str) -> RuleSet {
    let mut set = RuleSet::default();
    let mut seen: HashSet<String> = HashSet::new();

    for entry in text
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        match parse_rule(entry) {
            Ok(rule) => {
                if seen.insert(rule.code.clone()) {
                    set.rules.push(rule);
                } else {
                    set.rejected.push(RuleError::DuplicateCode {
                        entry: entry.to_string(),
                        code: rule.code,
                    });
                }
            }
            Err(e) => set.rejected.push(e),
        }
    }

    set
}

fn parse_rule(entry: &str) -> Result<MonitoringRule, RuleError> {
    let parts: Vec<&str> = entry.split('-').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(RuleError::FieldCount {
            entry: entry.to_string(),
            fields: parts.len(),
        });
    }
    if parts[0].is_empty() {
        return Err(RuleError::EmptyCode {
            entry: entry.to_string(),
        });
    }
    let up = parse_threshold(entry, "up", parts[1])?;
    let down = parse_threshold(entry, "down", parts[2])?;
    Ok(MonitoringRule {
        code: parts[0].to_string(),
        up_threshold: up,
        down_threshold: down,
    })
}

fn parse_threshold(entry: &str, side: &'static str, value: &str) -> Result<Decimal, RuleError> {
    let parsed = Decimal::from_str(value).map_err(|_| RuleError::InvalidThreshold {
        entry: entry.to_string(),
        side,
        value: value.to_string(),
    })?;
    if parsed <= Decimal::ZERO {
        return Err(RuleError::NonPositiveThreshold {
            entry: entry.to_string(),
            side,
        });
    }
    Ok(parsed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between cycles
    pub interval_secs: u64,
    /// `code-up-down` entries; each string may hold several comma-separated entries
    pub rules: Vec<String>,
    /// Quote universes fetched every cycle
    pub classes: Vec<InstrumentClass>,
    /// Group-bot key; alerts only go to the log when unset
    pub webhook_key: Option<String>,
    pub webhook_url: String,
    pub quotes_url: String,
    /// Reference zone for "today", in hours east of UTC
    pub utc_offset_hours: i32,
    pub ladder_len: usize,
    /// Render figures with bold digits
    pub styled_digits: bool,
    /// Days of alert state kept before the sweep drops it
    pub state_retention_days: u32,
    pub request_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            rules: Vec::new(),
            classes: vec![InstrumentClass::Etf, InstrumentClass::Lof],
            webhook_key: None,
            webhook_url: WECOM_WEBHOOK_URL.to_string(),
            quotes_url: SINA_QUOTES_URL.to_string(),
            utc_offset_hours: 8,
            ladder_len: DEFAULT_LADDER_LEN,
            styled_digits: true,
            state_retention_days: 7,
            request_timeout_secs: 10,
        }
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub codes: Option<String>,
    pub webhook_key: Option<String>,
    pub interval_secs: Option<u64>,
}

impl MonitorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid monitor config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Command-line rules replace the file's list rather than extending it.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(codes) = overrides.codes.filter(|c| !c.trim().is_empty()) {
            self.rules = vec![codes];
        }
        if let Some(key) = overrides.webhook_key.filter(|k| !k.trim().is_empty()) {
            self.webhook_key = Some(key);
        }
        if let Some(secs) = overrides.interval_secs {
            self.interval_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(anyhow!("interval_secs must be at least 1"));
        }
        if self.classes.is_empty() {
            return Err(anyhow!("at least one instrument class is required"));
        }
        if !(1..=MAX_LADDER_LEN).contains(&self.ladder_len) {
            return Err(anyhow!(
                "ladder_len must be between 1 and {}, got {}",
                MAX_LADDER_LEN,
                self.ladder_len
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be at least 1"));
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn rule_set(&self) -> RuleSet {
        parse_rules(&self.rules.join(","))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        if !(-14..=14).contains(&self.utc_offset_hours) {
            return Err(anyhow!(
                "utc_offset_hours must be within -14..=14, got {}",
                self.utc_offset_hours
            ));
        }
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("invalid utc offset {}h", self.utc_offset_hours))
    }

    pub fn webhook_key(&self) -> Option<&str> {
        self.webhook_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
