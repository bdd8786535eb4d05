//! Escalation Ladder
//!
//! Fibonacci-style multipliers (1, 2, 3, 5, 8, ...) that turn one base
//! threshold into successively larger trigger points.

use rust_decimal::Decimal;

/// Terms past this length no longer fit in a `u64`.
pub const MAX_LADDER_LEN: usize = 90;

pub const DEFAULT_LADDER_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationLadder {
    rungs: Vec<u64>,
}

impl EscalationLadder {
    /// Build the first `len` terms of 1, 2, 3, 5, 8, ...
    ///
    /// `len` is clamped to `1..=MAX_LADDER_LEN`.
    pub fn fibonacci(len: usize) -> Self {
        let len = len.clamp(1, MAX_LADDER_LEN);
        let mut rungs: Vec<u64> = Vec::with_capacity(len);
        for i in 0..len {
            let next = match i {
                0 => 1,
                1 => 2,
                _ => rungs[i - 1] + rungs[i - 2],
            };
            rungs.push(next);
        }
        Self { rungs }
    }

    #[inline]
    pub fn rung(&self, index: usize) -> Option<u64> {
        self.rungs.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Trigger point in percent for rung `index`: `base * 100 * ladder[index]`.
    ///
    /// `None` once the ladder is exhausted.
    pub fn trigger_pct(&self, base: Decimal, index: usize) -> Option<Decimal> {
        let multiplier = self.rung(index)?;
        base.checked_mul(Decimal::ONE_HUNDRED)?
            .checked_mul(Decimal::from(multiplier))
    }
}

impl Default for EscalationLadder {
    fn default() -> Self {
        Self::fibonacci(DEFAULT_LADDER_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_sequence() {
        let ladder = EscalationLadder::default();
        assert_eq!(ladder.len(), 20);
        let head: Vec<u64> = (0..10).filter_map(|i| ladder.rung(i)).collect();
        assert_eq!(head, vec![1, 2, 3, 5, 8, 13, 21, 34, 55, 89]);
        assert_eq!(ladder.rung(19), Some(10946));
        assert_eq!(ladder.rung(20), None);
    }

    #[test]
    fn test_strictly_increasing_at_max_len() {
        let ladder = EscalationLadder::fibonacci(10_000);
        assert_eq!(ladder.len(), MAX_LADDER_LEN);
        for i in 1..ladder.len() {
            assert!(ladder.rung(i).unwrap() > ladder.rung(i - 1).unwrap());
        }
    }

    #[test]
    fn test_short_ladders() {
        assert_eq!(EscalationLadder::fibonacci(0).len(), 1);
        assert_eq!(EscalationLadder::fibonacci(1).rung(0), Some(1));
        assert_eq!(EscalationLadder::fibonacci(2).rung(1), Some(2));
    }

    #[test]
    fn test_trigger_pct() {
        let ladder = EscalationLadder::default();
        assert_eq!(ladder.trigger_pct(dec!(0.10), 0), Some(dec!(10)));
        assert_eq!(ladder.trigger_pct(dec!(0.10), 3), Some(dec!(50)));
        assert_eq!(ladder.trigger_pct(dec!(0.10), 20), None);
    }
}
