use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time snapshot for one instrument, produced once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Bare instrument code, e.g. `159973`
    pub code: String,
    /// Exchange-prefixed symbol, e.g. `sz159973`
    pub symbol: String,
    pub name: String,
    /// Latest trade price
    pub trade: Decimal,
    /// Session opening price
    pub open: Decimal,
    /// Prior session closing price
    pub prior_close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: u64,
    pub amount: Decimal,
    /// Exchange clock time of the last tick, when the feed supplies one
    pub tick_time: Option<NaiveTime>,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Minimal quote carrying only the fields alerting looks at.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        trade: Decimal,
        open: Decimal,
        prior_close: Decimal,
    ) -> Self {
        let code = code.into();
        Self {
            symbol: code.clone(),
            code,
            name: name.into(),
            trade,
            open,
            prior_close,
            high: trade.max(open),
            low: trade.min(open),
            volume: 0,
            amount: Decimal::ZERO,
            tick_time: None,
            fetched_at: Utc::now(),
        }
    }
}

/// One watched instrument's thresholds. Both are fractions (0.10 = 10%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRule {
    pub code: String,
    pub up_threshold: Decimal,
    pub down_threshold: Decimal,
}

impl MonitoringRule {
    pub fn new(
        code: impl Into<String>,
        up_threshold: Decimal,
        down_threshold: Decimal,
    ) -> Result<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(anyhow!("rule code must not be empty"));
        }
        if up_threshold <= Decimal::ZERO || down_threshold <= Decimal::ZERO {
            return Err(anyhow!(
                "thresholds for {} must be positive (up={}, down={})",
                code,
                up_threshold,
                down_threshold
            ));
        }
        Ok(Self {
            code,
            up_threshold,
            down_threshold,
        })
    }

    #[inline]
    pub fn threshold(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Up => self.up_threshold,
            Direction::Down => self.down_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction of `to` relative to `from`; `None` when unchanged.
    pub fn between(from: Decimal, to: Decimal) -> Option<Self> {
        match from.cmp(&to) {
            std::cmp::Ordering::Less => Some(Direction::Up),
            std::cmp::Ordering::Greater => Some(Direction::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Red for up, green for down (mainland market colouring).
    pub fn glyph(&self) -> &'static str {
        match self {
            Direction::Up => "🔴",
            Direction::Down => "🟢",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// A quote universe the data source can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    ClosedFund,
    Etf,
    Lof,
}

impl InstrumentClass {
    /// Market-centre node name used in the quote query.
    pub fn node(&self) -> &'static str {
        match self {
            InstrumentClass::ClosedFund => "close_fund",
            InstrumentClass::Etf => "etf_hq_fund",
            InstrumentClass::Lof => "lof_hq_fund",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstrumentClass::ClosedFund => "closed-end funds",
            InstrumentClass::Etf => "ETF funds",
            InstrumentClass::Lof => "LOF funds",
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InstrumentClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed_fund" | "close_fund" | "closed" => Ok(InstrumentClass::ClosedFund),
            "etf" | "etf_hq_fund" => Ok(InstrumentClass::Etf),
            "lof" | "lof_hq_fund" => Ok(InstrumentClass::Lof),
            other => Err(anyhow!("unknown instrument class: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rule_rejects_non_positive_thresholds() {
        assert!(MonitoringRule::new("159973", dec!(0.10), dec!(0.05)).is_ok());
        assert!(MonitoringRule::new("159973", dec!(0), dec!(0.05)).is_err());
        assert!(MonitoringRule::new("159973", dec!(0.10), dec!(-0.01)).is_err());
        assert!(MonitoringRule::new("  ", dec!(0.10), dec!(0.05)).is_err());
    }

    #[test]
    fn test_direction_between() {
        assert_eq!(Direction::between(dec!(10.00), dec!(10.01)), Some(Direction::Up));
        assert_eq!(Direction::between(dec!(10.00), dec!(9.99)), Some(Direction::Down));
        assert_eq!(Direction::between(dec!(10.00), dec!(10.000)), None);
    }

    #[test]
    fn test_instrument_class_parsing() {
        assert_eq!("ETF".parse::<InstrumentClass>().unwrap(), InstrumentClass::Etf);
        assert_eq!("lof".parse::<InstrumentClass>().unwrap(), InstrumentClass::Lof);
        assert_eq!(
            "closed_fund".parse::<InstrumentClass>().unwrap(),
            InstrumentClass::ClosedFund
        );
        assert!("bond".parse::<InstrumentClass>().is_err());
        assert_eq!(InstrumentClass::Lof.node(), "lof_hq_fund");
    }
}
