use crate::fetch::{FetchError, FetchResult};
use serde::Deserialize;

/// Daily bars from the chart API, nulls already dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    pub highs: Vec<f64>,
    pub closes: Vec<f64>,
}

impl PriceHistory {
    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    pub fn max_high(&self) -> Option<f64> {
        self.highs.iter().copied().reduce(f64::max)
    }

    /// `(max(high) - last_close) / max(high) * 100`.
    pub fn drawdown_pct(&self) -> FetchResult<(f64, f64)> {
        let close = self.last_close().ok_or(FetchError::Empty("no closes in history"))?;
        let high = self.max_high().ok_or(FetchError::Empty("no highs in history"))?;
        if high <= 0.0 {
            return Err(FetchError::Parse(format!("non-positive high {high}")));
        }
        Ok((close, (high - close) / high * 100.0))
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

pub fn parse_chart(text: &str) -> FetchResult<PriceHistory> {
    let parsed = serde_json::from_str::<ChartResponse>(text)
        .map_err(|e| FetchError::Parse(format!("chart response: {e}")))?;

    if let Some(err) = parsed.chart.error {
        return Err(FetchError::Parse(format!(
            "chart API error {}: {}",
            err.code.unwrap_or_default(),
            err.description.unwrap_or_default()
        )));
    }

    let quote = parsed
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .and_then(|r| r.indicators.quote.into_iter().next())
        .ok_or(FetchError::Empty("chart result has no quote series"))?;

    let history = PriceHistory {
        highs: quote.high.into_iter().flatten().collect(),
        closes: quote.close.into_iter().flatten().collect(),
    };

    if history.closes.is_empty() {
        return Err(FetchError::Empty("chart history is empty"));
    }
    Ok(history)
}
