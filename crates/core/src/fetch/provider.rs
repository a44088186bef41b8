use crate::config::{MetalSpec, SourceSettings};
use crate::fetch::quotes::{parse_chart, PriceHistory};
use crate::fetch::{calendar, fred, html_table, FetchError, FetchResult, IndicatorSources};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const YIELD_RANGE: &str = "5d";
const METAL_RANGE: &str = "6mo";

/// Fetches every indicator from the public sources named in [`SourceSettings`].
#[derive(Debug, Clone)]
pub struct LiveSources {
    http: reqwest::Client,
    settings: SourceSettings,
}

impl LiveSources {
    pub fn from_settings(settings: &SourceSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let http = reqwest::Client::builder()
            .timeout(settings.fetch_timeout)
            .default_headers(headers)
            .build()
            .context("failed to build source http client")?;

        Ok(Self {
            http,
            settings: settings.clone(),
        })
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    async fn get_text(&self, url: reqwest::Url) -> FetchResult<String> {
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(res.text().await?)
    }

    fn chart_url(&self, symbol: &str, range: &str) -> FetchResult<reqwest::Url> {
        let mut url = parse_url(&self.settings.quote_base_url)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::NotConfigured("QUOTE_BASE_URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        url.query_pairs_mut()
            .append_pair("range", range)
            .append_pair("interval", "1d");
        Ok(url)
    }

    async fn chart(&self, symbol: &str, range: &str) -> FetchResult<PriceHistory> {
        let url = self.chart_url(symbol, range)?;
        let text = self.get_text(url).await?;
        parse_chart(&text)
    }

    async fn calendar_actual(&self, url: &str) -> FetchResult<f64> {
        let text = self.get_text(parse_url(url)?).await?;
        calendar::last_actual_value(&text)
            .ok_or(FetchError::Empty("no actual value on calendar page"))
    }

    async fn news_pmi(&self) -> FetchResult<f64> {
        let text = self
            .get_text(parse_url(&self.settings.foreign_pmi_fallback_url)?)
            .await?;
        calendar::first_news_pmi(&text).ok_or(FetchError::Empty("no PMI figure in news page"))
    }
}

#[async_trait::async_trait]
impl IndicatorSources for LiveSources {
    async fn domestic_long_yield(&self) -> FetchResult<f64> {
        let history = self
            .chart(&self.settings.domestic_yield_symbol, YIELD_RANGE)
            .await?;
        history
            .last_close()
            .ok_or(FetchError::Empty("yield history is empty"))
    }

    async fn foreign_long_yield(&self) -> FetchResult<f64> {
        let text = self
            .get_text(parse_url(&self.settings.foreign_yield_url)?)
            .await?;
        html_table::first_row_value(&text)
    }

    async fn metal_history(&self, metal: &MetalSpec) -> FetchResult<PriceHistory> {
        self.chart(&metal.symbol, METAL_RANGE).await
    }

    async fn domestic_pmi(&self) -> FetchResult<f64> {
        self.calendar_actual(&self.settings.domestic_pmi_url).await
    }

    async fn foreign_pmi(&self) -> FetchResult<f64> {
        match self.calendar_actual(&self.settings.foreign_pmi_url).await {
            Ok(v) if v > 0.0 => Ok(v),
            primary => {
                tracing::debug!(?primary, "foreign PMI calendar gave nothing; trying news page");
                self.news_pmi().await
            }
        }
    }

    async fn unemployment_rate(&self) -> FetchResult<f64> {
        let api_key = self
            .settings
            .fred_api_key
            .as_deref()
            .ok_or(FetchError::NotConfigured("FRED_API_KEY"))?;

        let mut url = parse_url(&self.settings.fred_base_url)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::NotConfigured("FRED_BASE_URL cannot be a base"))?
            .pop_if_empty()
            .extend(["fred", "series", "observations"]);
        url.query_pairs_mut()
            .append_pair("series_id", &self.settings.unemployment_series)
            .append_pair("api_key", api_key)
            .append_pair("file_type", "json")
            .append_pair("sort_order", "desc")
            .append_pair("limit", "12");

        let text = self.get_text(url).await?;
        let (date, value) = fred::latest_observation(&text)?;
        tracing::debug!(series = %self.settings.unemployment_series, %date, value, "latest observation");
        Ok(value)
    }
}

fn parse_url(s: &str) -> FetchResult<reqwest::Url> {
    reqwest::Url::parse(s).map_err(|e| FetchError::Parse(format!("invalid url {s:?}: {e}")))
}
