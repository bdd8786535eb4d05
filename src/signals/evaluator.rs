//! Rule Evaluator
//!
//! Turns one quote plus one rule into "notify or stay silent", consulting and
//! advancing the alert state for the instrument's current day. Two checks run
//! per pair: the once-a-day gap-open check and the intraday escalation
//! ratchet.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{Direction, InstrumentClass, MonitoringRule, Quote};
use crate::signals::ladder::EscalationLadder;
use crate::signals::state::AlertStateStore;

/// Something a cycle wants to tell the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// Opening price differs from the prior close; fires once per day.
    GapOpen {
        code: String,
        name: String,
        direction: Direction,
        pct: Decimal,
    },
    /// Intraday move crossed one or more new rungs. `rung` is the new index.
    Intraday {
        code: String,
        name: String,
        direction: Direction,
        pct: Decimal,
        rung: usize,
    },
    MissingInstrument {
        code: String,
    },
    FetchFailed {
        class: InstrumentClass,
        error: String,
    },
}

/// `(a - b) / a * 100`. `None` when `a` is zero.
#[inline]
pub fn percent_change(a: Decimal, b: Decimal) -> Option<Decimal> {
    if a.is_zero() {
        return None;
    }
    a.checked_sub(b)?
        .checked_div(a)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Advance `start` past every rung whose trigger `abs(move_pct)` reaches.
///
/// The result is never below `start` and never above `ladder.len()`.
pub fn ratchet(move_pct: Decimal, base: Decimal, ladder: &EscalationLadder, start: usize) -> usize {
    let magnitude = move_pct.abs();
    let mut index = start;
    while let Some(trigger) = ladder.trigger_pct(base, index) {
        if magnitude < trigger {
            break;
        }
        index += 1;
    }
    index
}

pub struct RuleEvaluator {
    ladder: EscalationLadder,
}

impl RuleEvaluator {
    pub fn new(ladder: EscalationLadder) -> Self {
        Self { ladder }
    }

    pub fn evaluate(
        &self,
        quote: &Quote,
        rule: &MonitoringRule,
        store: &AlertStateStore,
        day: NaiveDate,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(event) = self.check_gap_open(quote, store, day) {
            events.push(event);
        }
        if let Some(event) = self.check_intraday(quote, rule, store, day) {
            events.push(event);
        }
        events
    }

    /// Opening price vs prior close, reported once per instrument per day.
    pub fn check_gap_open(
        &self,
        quote: &Quote,
        store: &AlertStateStore,
        day: NaiveDate,
    ) -> Option<AlertEvent> {
        // New listings have no prior close
        if quote.prior_close.is_zero() {
            return None;
        }
        // Zero open (pre-session) yields None here
        let pct = percent_change(quote.open, quote.prior_close)?;
        let direction = Direction::between(quote.prior_close, quote.open)?;

        let first = store.with_state(&quote.code, day, |state| {
            if state.gap_notified {
                false
            } else {
                state.gap_notified = true;
                true
            }
        });
        if !first {
            return None;
        }

        info!(code = %quote.code, direction = direction.as_str(), %pct, "gap open");
        Some(AlertEvent::GapOpen {
            code: quote.code.clone(),
            name: quote.name.clone(),
            direction,
            pct,
        })
    }

    /// Trade price vs open, escalating through the ladder.
    pub fn check_intraday(
        &self,
        quote: &Quote,
        rule: &MonitoringRule,
        store: &AlertStateStore,
        day: NaiveDate,
    ) -> Option<AlertEvent> {
        if quote.open.is_zero() {
            return None;
        }
        let pct = percent_change(quote.trade, quote.open)?;
        let direction = Direction::between(quote.open, quote.trade)?;
        let base = rule.threshold(direction);

        let (from, to) = store.with_state(&quote.code, day, |state| {
            let slot = match direction {
                Direction::Up => &mut state.up_rung,
                Direction::Down => &mut state.down_rung,
            };
            let from = *slot;
            let to = ratchet(pct, base, &self.ladder, from);
            *slot = to;
            (from, to)
        });

        if to == from {
            return None;
        }
        if to >= self.ladder.len() {
            debug!(code = %quote.code, direction = direction.as_str(), "escalation ladder exhausted");
        }

        info!(
            code = %quote.code,
            direction = direction.as_str(),
            %pct,
            from,
            to,
            "intraday escalation"
        );
        Some(AlertEvent::Intraday {
            code: quote.code.clone(),
            name: quote.name.clone(),
            direction,
            pct,
            rung: to,
        })
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(EscalationLadder::default())
    }
}
