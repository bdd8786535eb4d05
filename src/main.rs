//! Fundwatch - fund price alert monitor
//!
//! Usage:
//!   fundwatch --config fundwatch.toml
//!   fundwatch --codes "159973-0.10-0.05,501018-0.02-0.02" --wx-key <key>
//!
//! Environment Variables:
//!   FUNDWATCH_CONFIG         - Path to TOML config file
//!   FUNDWATCH_CODES          - Rule list, `code-up-down` entries
//!   WECOM_WEBHOOK_KEY        - Group bot key; alerts go to the log when unset
//!   FUNDWATCH_INTERVAL_SECS  - Seconds between cycles
//!   RUST_LOG                 - Log filter (default: fundwatch=info)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use dotenv::dotenv;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fundwatch::config::{MonitorConfig, Overrides};
use fundwatch::monitor::Monitor;
use fundwatch::notify::{LogSink, NotificationSink, WeComWebhook};
use fundwatch::scrapers::{QuoteSource, SinaQuoteClient};
use fundwatch::signals::{AlertStateStore, EscalationLadder, MessageFormatter, RuleEvaluator};

const STATE_PRUNE_POLL_SECS: u64 = 3600;

#[derive(Parser, Debug)]
#[command(name = "fundwatch")]
#[command(about = "Gap-open and intraday escalation alerts for listed funds")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "FUNDWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Rules as `code-up-down`, comma separated (replaces the config file list)
    #[arg(long, env = "FUNDWATCH_CODES")]
    codes: Option<String>,

    /// WeCom group bot key
    #[arg(long = "wx-key", env = "WECOM_WEBHOOK_KEY", hide_env_values = true)]
    wx_key: Option<String>,

    /// Seconds between cycles
    #[arg(short, long, env = "FUNDWATCH_INTERVAL_SECS")]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            MonitorConfig::load(path)?
        }
        None => {
            info!("no config file given, using defaults");
            MonitorConfig::default()
        }
    };
    config.apply(Overrides {
        codes: args.codes,
        webhook_key: args.wx_key,
        interval_secs: args.interval,
    });
    config.validate()?;

    let rule_set = config.rule_set();
    for rejected in &rule_set.rejected {
        warn!("{}", rejected);
    }
    if rule_set.rules.is_empty() {
        return Err(anyhow!(
            "no valid monitoring rules configured (set --codes or `rules` in the config file)"
        ));
    }
    for rule in &rule_set.rules {
        info!(
            code = %rule.code,
            up = %rule.up_threshold,
            down = %rule.down_threshold,
            "watching"
        );
    }

    let source: Arc<dyn QuoteSource> = Arc::new(
        SinaQuoteClient::with_base_url(config.quotes_url.clone(), config.request_timeout())
            .context("Failed to build quote client")?,
    );
    let sink: Arc<dyn NotificationSink> = match config.webhook_key() {
        Some(key) => {
            info!("alerts will be pushed to the WeCom group bot");
            Arc::new(WeComWebhook::with_url(
                config.webhook_url.clone(),
                key,
                config.request_timeout(),
            )?)
        }
        None => {
            warn!("no webhook key configured, alerts will only be logged");
            Arc::new(LogSink)
        }
    };

    let store = Arc::new(AlertStateStore::new(config.utc_offset()?));
    let monitor = Arc::new(Monitor::new(
        source,
        sink,
        rule_set.rules,
        config.classes.clone(),
        store.clone(),
        RuleEvaluator::new(EscalationLadder::fibonacci(config.ladder_len)),
        MessageFormatter::new(config.styled_digits),
    ));

    tokio::spawn(state_pruning_polling(store, config.state_retention_days));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let monitor = monitor.clone();
        let period = config.interval();
        tokio::spawn(async move { monitor.run(period, shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutdown requested, waiting for the current cycle to finish");
    let _ = shutdown_tx.send(true);

    if let Err(e) = runner.await {
        error!("monitor task failed: {}", e);
    }
    Ok(())
}

/// Initialize tracing; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fundwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // cwd + parents first, then the crate directory
    let _ = dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

/// Drop alert state for days older than the retention window.
async fn state_pruning_polling(store: Arc<AlertStateStore>, retention_days: u32) {
    let mut ticker = interval(Duration::from_secs(STATE_PRUNE_POLL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let today = store.resolve_day(Utc::now());
        let Some(cutoff) = today.checked_sub_signed(ChronoDuration::days(i64::from(retention_days)))
        else {
            continue;
        };
        let pruned = store.prune_before(cutoff);
        if pruned > 0 {
            info!(pruned, retained = store.len(), %cutoff, "🧹 pruned alert state");
        }
    }
}
