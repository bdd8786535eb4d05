//! Alert State Store
//!
//! Per-(instrument, calendar day) record of what has already been notified.
//! The day is part of the key, so a new trading day starts from a clean
//! state without any explicit reset.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// Exchange time zone (UTC+08:00).
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub gap_notified: bool,
    pub up_rung: usize,
    pub down_rung: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
    code: String,
    day: NaiveDate,
}

pub struct AlertStateStore {
    entries: Mutex<HashMap<StateKey, AlertState>>,
    offset: FixedOffset,
}

impl AlertStateStore {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            offset,
        }
    }

    /// Calendar day of `now` in the store's reference zone.
    pub fn resolve_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Run `f` against the state for `(code, day)` while holding the store lock,
    /// inserting a zeroed entry first if there is none.
    pub fn with_state<R>(
        &self,
        code: &str,
        day: NaiveDate,
        f: impl FnOnce(&mut AlertState) -> R,
    ) -> R {
        let mut entries = self.entries.lock();
        let key = StateKey {
            code: code.to_string(),
            day,
        };
        if !entries.contains_key(&key) {
            debug!(code, %day, "creating alert state");
        }
        f(entries.entry(key).or_default())
    }

    pub fn snapshot(&self, code: &str, day: NaiveDate) -> Option<AlertState> {
        let key = StateKey {
            code: code.to_string(),
            day,
        };
        self.entries.lock().get(&key).copied()
    }

    /// Drop every entry for a day before `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| key.day >= cutoff);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for AlertStateStore {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        Self::new(offset)
    }
}
