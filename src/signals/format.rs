//! Alert message rendering.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::signals::evaluator::AlertEvent;

/// Separator between lines of one outbound message.
pub const LINE_SEPARATOR: &str = "\n\n";

/// U+1D7EC MATHEMATICAL SANS-SERIF BOLD DIGIT ZERO
const STYLED_ZERO: u32 = 0x1D7EC;

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFormatter {
    styled_digits: bool,
}

impl MessageFormatter {
    pub fn new(styled_digits: bool) -> Self {
        Self { styled_digits }
    }

    pub fn render(&self, event: &AlertEvent) -> String {
        match event {
            AlertEvent::GapOpen {
                name,
                direction,
                pct,
                ..
            } => format!(
                "[{}] {} gapped {} {}%",
                name,
                direction.glyph(),
                direction.as_str(),
                self.format_pct(*pct)
            ),
            AlertEvent::Intraday {
                name,
                direction,
                pct,
                ..
            } => format!(
                "[{}] {} intraday {}%",
                name,
                direction.glyph(),
                self.format_pct(*pct)
            ),
            AlertEvent::MissingInstrument { code } => {
                format!("no matching instrument for code {}", code)
            }
            AlertEvent::FetchFailed { class, error } => {
                format!("failed to fetch {}: {}", class, error)
            }
        }
    }

    /// Two decimal places, half-to-even, computed in decimal arithmetic.
    pub fn format_pct(&self, pct: Decimal) -> String {
        let rounded = pct.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        let text = format!("{:.2}", rounded);
        if self.styled_digits {
            stylize_digits(&text)
        } else {
            text
        }
    }

    /// Render every event and join them into one message body.
    pub fn compose<'a>(&self, events: impl IntoIterator<Item = &'a AlertEvent>) -> String {
        join(events.into_iter().map(|event| self.render(event)))
    }
}

/// Join lines with a blank line between them and none after the last.
pub fn join(lines: impl IntoIterator<Item = String>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push_str(LINE_SEPARATOR);
    }
    match out.strip_suffix(LINE_SEPARATOR) {
        Some(trimmed) => trimmed.to_string(),
        None => out,
    }
}

/// Swap ASCII digits for their bold sans-serif counterparts.
pub fn stylize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(STYLED_ZERO + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, InstrumentClass};
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_pct_two_places() {
        let f = MessageFormatter::new(false);
        assert_eq!(f.format_pct(dec!(12)), "12.00");
        assert_eq!(f.format_pct(dec!(10.7142857142857)), "10.71");
        assert_eq!(f.format_pct(dec!(-11.111)), "-11.11");
        assert_eq!(f.format_pct(dec!(5.265)), "5.26");
        assert_eq!(f.format_pct(dec!(5.275)), "5.28");
    }

    #[test]
    fn test_stylize_digits() {
        assert_eq!(stylize_digits("-1.05"), "-𝟭.𝟬𝟱");
        assert_eq!(stylize_digits("0123456789"), "𝟬𝟭𝟮𝟯𝟰𝟱𝟲𝟳𝟴𝟵");
        assert_eq!(stylize_digits("abc"), "abc");
    }

    #[test]
    fn test_render_lines() {
        let f = MessageFormatter::new(false);
        let gap = AlertEvent::GapOpen {
            code: "X".into(),
            name: "Fund X".into(),
            direction: Direction::Up,
            pct: dec!(5),
        };
        assert_eq!(f.render(&gap), "[Fund X] 🔴 gapped up 5.00%");

        let intraday = AlertEvent::Intraday {
            code: "X".into(),
            name: "Fund X".into(),
            direction: Direction::Down,
            pct: dec!(-3.456),
            rung: 1,
        };
        assert_eq!(f.render(&intraday), "[Fund X] 🟢 intraday -3.46%");

        let missing = AlertEvent::MissingInstrument { code: "123".into() };
        assert_eq!(f.render(&missing), "no matching instrument for code 123");

        let failed = AlertEvent::FetchFailed {
            class: InstrumentClass::Lof,
            error: "timeout".into(),
        };
        assert_eq!(f.render(&failed), "failed to fetch LOF funds: timeout");
    }

    #[test]
    fn test_join_trims_trailing_separator() {
        assert_eq!(join(Vec::<String>::new()), "");
        assert_eq!(join(vec!["a".to_string()]), "a");
        assert_eq!(join(vec!["a".to_string(), "b".to_string()]), "a\n\nb");
    }
}
