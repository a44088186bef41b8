//! Upstream data sources.
//!
//! Every fetch returns a [`FetchResult`]; nothing here decides what a failure looks like on the
//! dashboard. The aggregator maps failures to display sentinels.

pub mod calendar;
pub mod fred;
pub mod html_table;
pub mod provider;
pub mod quotes;

use crate::config::MetalSpec;

pub use provider::LiveSources;
pub use quotes::PriceHistory;

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("source not configured: {0}")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("no data: {0}")]
    Empty(&'static str),

    #[error("timed out")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait IndicatorSources: Send + Sync {
    /// Latest close of the domestic 10Y yield proxy.
    async fn domestic_long_yield(&self) -> FetchResult<f64>;

    /// Foreign 10Y yield from the static chart page.
    async fn foreign_long_yield(&self) -> FetchResult<f64>;

    /// About six months of daily highs and closes.
    async fn metal_history(&self, metal: &MetalSpec) -> FetchResult<PriceHistory>;

    async fn domestic_pmi(&self) -> FetchResult<f64>;

    /// Calendar page first, news page as fallback.
    async fn foreign_pmi(&self) -> FetchResult<f64>;

    async fn unemployment_rate(&self) -> FetchResult<f64>;
}
