//! Cycle Orchestrator
//!
//! One cycle = fetch every configured instrument class, evaluate every rule,
//! aggregate the emitted lines into one message, deliver it. At most one cycle
//! is ever in flight; ticks that arrive while a cycle runs are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rayon::prelude::*;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::{InstrumentClass, MonitoringRule, Quote};
use crate::notify::NotificationSink;
use crate::scrapers::QuoteSource;
use crate::signals::{AlertEvent, AlertStateStore, MessageFormatter, RuleEvaluator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing to say this cycle
    Skipped,
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub events: Vec<AlertEvent>,
    pub message: Option<String>,
    pub delivery: Delivery,
}

pub struct Monitor {
    source: Arc<dyn QuoteSource>,
    sink: Arc<dyn NotificationSink>,
    rules: Vec<MonitoringRule>,
    classes: Vec<InstrumentClass>,
    store: Arc<AlertStateStore>,
    evaluator: RuleEvaluator,
    formatter: MessageFormatter,
    running: AtomicBool,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Monitor {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        sink: Arc<dyn NotificationSink>,
        rules: Vec<MonitoringRule>,
        classes: Vec<InstrumentClass>,
        store: Arc<AlertStateStore>,
        evaluator: RuleEvaluator,
        formatter: MessageFormatter,
    ) -> Self {
        Self {
            source,
            sink,
            rules,
            classes,
            store,
            evaluator,
            formatter,
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<AlertStateStore> {
        &self.store
    }

    pub fn rules(&self) -> &[MonitoringRule] {
        &self.rules
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Idle -> Running -> Idle. Returns `None` when a cycle is already in flight.
    pub async fn on_tick(&self, now: DateTime<Utc>) -> Option<CycleReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("cycle still running, dropping tick");
            return None;
        }
        let _guard = RunningGuard(&self.running);
        Some(self.run_cycle(now).await)
    }

    /// Fetch, evaluate, aggregate and deliver once.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let day = self.store.resolve_day(now);
        let mut events: Vec<AlertEvent> = Vec::new();

        let fetches = self.classes.iter().map(|&class| {
            let source = self.source.clone();
            async move { (class, source.fetch_quotes(class).await) }
        });

        let mut quotes: HashMap<String, Quote> = HashMap::new();
        let mut any_failed = false;
        for (class, result) in join_all(fetches).await {
            match result {
                Ok(batch) => {
                    debug!(class = %class, count = batch.len(), "quotes fetched");
                    for quote in batch {
                        quotes.insert(quote.code.clone(), quote);
                    }
                }
                Err(e) => {
                    warn!(class = %class, error = %e, "quote fetch failed");
                    any_failed = true;
                    events.push(AlertEvent::FetchFailed {
                        class,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        let evaluated: Vec<Vec<AlertEvent>> = self
            .rules
            .par_iter()
            .map(|rule| match quotes.get(&rule.code) {
                Some(quote) => self.evaluator.evaluate(quote, rule, &self.store, day),
                None if any_failed => {
                    debug!(code = %rule.code, "no quote, class fetch failed this cycle");
                    Vec::new()
                }
                None => {
                    warn!(code = %rule.code, "no matching instrument");
                    vec![AlertEvent::MissingInstrument {
                        code: rule.code.clone(),
                    }]
                }
            })
            .collect();
        events.extend(evaluated.into_iter().flatten());

        let body = self.formatter.compose(&events);
        if body.is_empty() {
            debug!(%day, quotes = quotes.len(), "cycle complete, nothing to report");
            return CycleReport {
                events,
                message: None,
                delivery: Delivery::Skipped,
            };
        }

        info!(%day, lines = events.len(), "delivering alert message");
        debug!("alert message:\n{}", body);
        let delivery = match self.sink.deliver(&body).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                warn!(error = %e, "alert delivery failed");
                Delivery::Failed(format!("{:#}", e))
            }
        };

        CycleReport {
            events,
            message: Some(body),
            delivery,
        }
    }

    /// Tick every `period` until `shutdown` flips to true.
    ///
    /// The first cycle starts one period after the call. A cycle that is
    /// already running when shutdown arrives is allowed to finish.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_secs = period.as_secs_f64(),
            rules = self.rules.len(),
            classes = self.classes.len(),
            "monitor loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let scheduled = tokio::select! {
                scheduled = ticker.tick() => scheduled,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let started = Instant::now();
            if let Some(report) = self.on_tick(Utc::now()).await {
                debug!(
                    events = report.events.len(),
                    delivery = ?report.delivery,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cycle finished"
                );
            }

            let next_due = scheduled + period;
            if Instant::now() >= next_due {
                // ticks missed while running are dropped, not replayed
                ticker.reset();
            } else {
                ticker.reset_at(next_due);
            }
        }

        info!("monitor loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct StaticSource {
        etf: Mutex<Result<Vec<Quote>, String>>,
        lof: Mutex<Result<Vec<Quote>, String>>,
    }

    #[async_trait]
    impl QuoteSource for StaticSource {
        async fn fetch_quotes(&self, class: InstrumentClass) -> Result<Vec<Quote>> {
            let slot = match class {
                InstrumentClass::Lof => &self.lof,
                _ => &self.etf,
            };
            slot.lock().clone().map_err(|e| anyhow!(e))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, message: &str) -> Result<()> {
            self.messages.lock().push(message.to_string());
            if self.fail {
                Err(anyhow!("webhook down"))
            } else {
                Ok(())
            }
        }
    }

    fn monitor(
        source: StaticSource,
        sink: Arc<RecordingSink>,
        rules: Vec<MonitoringRule>,
    ) -> Monitor {
        Monitor::new(
            Arc::new(source),
            sink,
            rules,
            vec![InstrumentClass::Etf, InstrumentClass::Lof],
            Arc::new(AlertStateStore::default()),
            RuleEvaluator::default(),
            MessageFormatter::new(false),
        )
    }

    fn rule(code: &str) -> MonitoringRule {
        MonitoringRule::new(code, dec!(0.10), dec!(0.05)).unwrap()
    }

    #[tokio::test]
    async fn test_merges_classes_and_reports_missing() {
        let source = StaticSource {
            etf: Mutex::new(Ok(vec![Quote::new("A", "Fund A", dec!(10), dec!(10), dec!(9.5))])),
            lof: Mutex::new(Ok(vec![Quote::new("B", "Fund B", dec!(10), dec!(10), dec!(10))])),
        };
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(source, sink.clone(), vec![rule("A"), rule("B"), rule("C")]);

        let report = monitor.run_cycle(Utc::now()).await;
        assert_eq!(report.delivery, Delivery::Delivered);
        assert_eq!(report.events.len(), 2);
        assert_eq!(
            report.message.as_deref(),
            Some("[Fund A] 🔴 gapped up 5.00%\n\nno matching instrument for code C")
        );
        assert_eq!(sink.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_quiet_cycle_does_not_deliver() {
        let source = StaticSource {
            etf: Mutex::new(Ok(vec![Quote::new("A", "Fund A", dec!(10), dec!(10), dec!(10))])),
            lof: Mutex::new(Ok(Vec::new())),
        };
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(source, sink.clone(), vec![rule("A")]);

        let report = monitor.run_cycle(Utc::now()).await;
        assert_eq!(report.delivery, Delivery::Skipped);
        assert!(report.message.is_none());
        assert!(sink.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_and_other_classes_evaluated() {
        let source = StaticSource {
            etf: Mutex::new(Ok(vec![Quote::new("A", "Fund A", dec!(11), dec!(9.9), dec!(9.9))])),
            lof: Mutex::new(Err("connection reset".to_string())),
        };
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(source, sink.clone(), vec![rule("A"), rule("B")]);

        let report = monitor.run_cycle(Utc::now()).await;
        let message = report.message.unwrap();
        assert!(message.starts_with("failed to fetch LOF funds: connection reset"));
        assert!(message.contains("[Fund A] 🔴 intraday 10.00%"));
        // B probably lives in the failed class; no misleading not-found line
        assert!(!message.contains("code B"));
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_state() {
        let source = StaticSource {
            etf: Mutex::new(Ok(vec![Quote::new("A", "Fund A", dec!(11), dec!(9.9), dec!(9.9))])),
            lof: Mutex::new(Ok(Vec::new())),
        };
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let monitor = monitor(source, sink.clone(), vec![rule("A")]);

        let now = Utc::now();
        let report = monitor.run_cycle(now).await;
        assert!(matches!(report.delivery, Delivery::Failed(ref e) if e.contains("webhook down")));

        let day = monitor.store().resolve_day(now);
        assert_eq!(monitor.store().snapshot("A", day).unwrap().up_rung, 1);

        // already notified rung is not re-sent on the next cycle
        let report = monitor.run_cycle(now).await;
        assert_eq!(report.delivery, Delivery::Skipped);
    }

    #[tokio::test]
    async fn test_on_tick_drops_overlapping_cycle() {
        let source = StaticSource {
            etf: Mutex::new(Ok(Vec::new())),
            lof: Mutex::new(Ok(Vec::new())),
        };
        let monitor = monitor(source, Arc::new(RecordingSink::default()), Vec::new());

        monitor.running.store(true, Ordering::Release);
        assert!(monitor.on_tick(Utc::now()).await.is_none());

        monitor.running.store(false, Ordering::Release);
        assert!(monitor.on_tick(Utc::now()).await.is_some());
        assert!(!monitor.is_running());
    }
}
