//! Notification sinks.
//!
//! Delivery is kept apart from diagnostics: the monitor logs what it is about
//! to send through `tracing`, then hands the text to a sink.

pub mod wecom;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

pub use wecom::WeComWebhook;

/// Delivers one aggregated alert message.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, message: &str) -> Result<()>;
}

/// Sink used when no webhook is configured; the message only reaches the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, message: &str) -> Result<()> {
        info!(target: "fundwatch::alerts", "{}", message);
        Ok(())
    }
}
