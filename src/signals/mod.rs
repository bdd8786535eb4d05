pub mod evaluator;
pub mod format;
pub mod ladder;
pub mod state;

pub use evaluator::{percent_change, ratchet, AlertEvent, RuleEvaluator};
pub use format::MessageFormatter;
pub use ladder::EscalationLadder;
pub use state::{AlertState, AlertStateStore};
