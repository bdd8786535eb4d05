//! Sina market-centre quote client.
//!
//! Pulls a whole instrument class in one JSONP request and decodes the rows
//! into exact-decimal [`Quote`]s.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{InstrumentClass, Quote};
use crate::scrapers::QuoteSource;

pub const SINA_QUOTES_URL: &str = "http://vip.stock.finance.sina.com.cn/quotes_service/api/jsonp.php/IO.XSRV2.CallbackList['da_yPT46_Ll7K6WD']/Market_Center.getHQNodeDataSimple";

const PAGE_SIZE: &str = "1000";

pub struct SinaQuoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl SinaQuoteClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(SINA_QUOTES_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fundwatch/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl QuoteSource for SinaQuoteClient {
    async fn fetch_quotes(&self, class: InstrumentClass) -> Result<Vec<Quote>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("page", "1"),
                ("num", PAGE_SIZE),
                ("sort", "symbol"),
                ("asc", "0"),
                ("node", class.node()),
            ])
            .send()
            .await
            .with_context(|| format!("{} quote request failed", class))?
            .error_for_status()
            .with_context(|| format!("{} quote status", class))?;

        let body = response
            .text()
            .await
            .with_context(|| format!("{} quote body", class))?;
        debug!(class = %class, body_len = body.len(), "quote response received");

        let quotes = parse_jsonp(&body, Utc::now())?;
        debug!(class = %class, count = quotes.len(), "quotes decoded");
        Ok(quotes)
    }
}

/// Strip the JSONP callback wrapper and decode the row array.
pub fn parse_jsonp(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<Quote>> {
    let start = body
        .find("([")
        .ok_or_else(|| anyhow!("quote response has no JSONP payload"))?;
    let end = body
        .rfind("])")
        .filter(|&end| end > start)
        .ok_or_else(|| anyhow!("quote response JSONP payload is truncated"))?;
    let json = &body[start + 1..=end];

    let rows: Vec<SinaRow> = serde_json::from_str(json)
        .map_err(|e| {
            warn!(error = %e, body_preview = %json.chars().take(200).collect::<String>(), "quote JSON parse failed");
            e
        })
        .context("quote json parse")?;

    Ok(rows.into_iter().map(|row| row.into_quote(fetched_at)).collect())
}

#[derive(Debug, Deserialize)]
struct SinaRow {
    symbol: String,
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "de_decimal")]
    trade: Decimal,
    /// Prior session close
    #[serde(default, deserialize_with = "de_decimal")]
    settlement: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    open: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    high: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    low: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    volume: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    amount: Decimal,
    #[serde(default)]
    ticktime: Option<String>,
}

impl SinaRow {
    fn into_quote(self, fetched_at: DateTime<Utc>) -> Quote {
        let tick_time = self
            .ticktime
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M:%S").ok());
        let volume = self.volume.trunc().to_u64().unwrap_or_default();
        Quote {
            code: self.code,
            symbol: self.symbol,
            name: self.name,
            trade: self.trade,
            open: self.open,
            prior_close: self.settlement,
            high: self.high,
            low: self.low,
            volume,
            amount: self.amount,
            tick_time,
            fetched_at,
        }
    }
}

/// Prices arrive as strings ("1.234"), occasionally as numbers or blanks.
fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(Decimal::ZERO),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(serde::de::Error::custom)
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(Decimal::ZERO)
            } else {
                Decimal::from_str(s).map_err(serde::de::Error::custom)
            }
        }
        _ => Err(serde::de::Error::custom("expected a decimal string or number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BODY: &str = r#"/*<script>location.href='//sina.com';</script>*/
IO.XSRV2.CallbackList['da_yPT46_Ll7K6WD'](([{"symbol":"sz159973","code":"159973","name":"Tech ETF","trade":"1.105","pricechange":"0.012","changepercent":"1.098","buy":"1.104","sell":"1.105","settlement":"1.093","open":"1.100","high":"1.110","low":"1.095","volume":12345600,"amount":13650000,"ticktime":"15:00:03"},{"symbol":"sh511130","code":"511130","name":"Bond ETF","trade":"102.350","settlement":"102.350","open":"0.000","high":"0","low":"","volume":0,"amount":0,"ticktime":"09:15:00"}]));"#;

    #[test]
    fn test_parse_jsonp_rows() {
        let now = Utc::now();
        let quotes = parse_jsonp(BODY, now).unwrap();
        assert_eq!(quotes.len(), 2);

        let q = &quotes[0];
        assert_eq!(q.code, "159973");
        assert_eq!(q.symbol, "sz159973");
        assert_eq!(q.name, "Tech ETF");
        assert_eq!(q.trade, dec!(1.105));
        assert_eq!(q.open, dec!(1.100));
        assert_eq!(q.prior_close, dec!(1.093));
        assert_eq!(q.volume, 12_345_600);
        assert_eq!(q.amount, dec!(13650000));
        assert_eq!(q.tick_time, NaiveTime::from_hms_opt(15, 0, 3));
        assert_eq!(q.fetched_at, now);

        let q = &quotes[1];
        assert!(q.open.is_zero());
        assert!(q.low.is_zero());
    }

    #[test]
    fn test_parse_jsonp_rejects_missing_payload() {
        assert!(parse_jsonp("null", Utc::now()).is_err());
        assert!(parse_jsonp("cb(([{\"symbol\":", Utc::now()).is_err());
    }

    #[test]
    fn test_parse_jsonp_rejects_bad_price() {
        let body = r#"cb(([{"symbol":"sz1","code":"1","trade":"abc"}]));"#;
        assert!(parse_jsonp(body, Utc::now()).is_err());
    }

    #[test]
    fn test_parse_jsonp_empty_class() {
        let body = "cb(([]));";
        assert!(parse_jsonp(body, Utc::now()).unwrap().is_empty());
    }
}
