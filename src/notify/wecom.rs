//! WeCom (WeChat Work) group-bot webhook.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::notify::NotificationSink;

pub const WECOM_WEBHOOK_URL: &str = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send";

pub struct WeComWebhook {
    client: reqwest::Client,
    url: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl WeComWebhook {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_url(WECOM_WEBHOOK_URL, key, timeout)
    }

    pub fn with_url(
        url: impl Into<String>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            key: key.into(),
        })
    }
}

/// Text message body for the group bot.
pub fn text_payload(message: &str) -> serde_json::Value {
    json!({
        "msgtype": "text",
        "text": { "content": message },
    })
}

#[async_trait]
impl NotificationSink for WeComWebhook {
    async fn deliver(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.key.as_str())])
            .json(&text_payload(message))
            .send()
            .await
            .context("webhook request failed")?
            .error_for_status()
            .context("webhook status")?;

        let reply: WebhookReply = response.json().await.context("webhook reply json")?;
        if reply.errcode != 0 {
            return Err(anyhow!(
                "webhook rejected message: errcode={} errmsg={}",
                reply.errcode,
                reply.errmsg
            ));
        }

        debug!(bytes = message.len(), "webhook delivered");
        Ok(())
    }
}
