//! Market data sources.

pub mod sina;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{InstrumentClass, Quote};

pub use sina::SinaQuoteClient;

/// Supplies the current quotes for one instrument class.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quotes(&self, class: InstrumentClass) -> Result<Vec<Quote>>;
}
