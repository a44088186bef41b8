pub mod dashboard;
pub mod domain;
pub mod fetch;
pub mod ingest;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    use crate::ingest::ValidationPolicy;

    const DEFAULT_QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";
    const DEFAULT_FOREIGN_YIELD_URL: &str = "https://www.cnyes.com/futures/html5chart/JP10YY.html";
    const DEFAULT_DOMESTIC_PMI_URL: &str =
        "https://www.investing.com/economic-calendar/ism-manufacturing-pmi-173";
    const DEFAULT_FOREIGN_PMI_URL: &str =
        "https://www.investing.com/economic-calendar/chinese-manufacturing-pmi-594";
    const DEFAULT_FOREIGN_PMI_FALLBACK_URL: &str = "https://news.cnyes.com/news/cat/china_pmi";
    const DEFAULT_FRED_BASE_URL: &str = "https://api.stlouisfed.org";
    const DEFAULT_METALS: &str = "Gold:GC=F,Silver:SI=F,Copper:HG=F";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub upload_secret: Option<String>,
        pub upload_validation: ValidationPolicy,
        pub display_utc_offset_hours: i32,
        pub live_fallback: bool,
        pub sources: SourceSettings,
    }

    /// Everything the fetchers and the aggregator need for one crawl.
    #[derive(Debug, Clone)]
    pub struct SourceSettings {
        pub fetch_timeout: Duration,
        pub crawl_budget: Duration,
        /// Stand-in for a fetched 3M rate in the inversion check.
        pub short_rate_reference: f64,
        pub quote_base_url: String,
        pub domestic_yield_symbol: String,
        pub foreign_yield_url: String,
        pub domestic_pmi_url: String,
        pub foreign_pmi_url: String,
        pub foreign_pmi_fallback_url: String,
        pub fred_base_url: String,
        pub fred_api_key: Option<String>,
        pub unemployment_series: String,
        pub metals: Vec<MetalSpec>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MetalSpec {
        pub name: String,
        pub symbol: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let upload_validation = match std::env::var("UPLOAD_VALIDATION") {
                Ok(s) => s.parse::<ValidationPolicy>()?,
                Err(_) => ValidationPolicy::default(),
            };

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                upload_secret: std::env::var("UPLOAD_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty()),
                upload_validation,
                display_utc_offset_hours: env_parse("DISPLAY_UTC_OFFSET_HOURS").unwrap_or(8),
                live_fallback: env_parse("LIVE_FALLBACK").unwrap_or(true),
                sources: SourceSettings::from_env()?,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    impl SourceSettings {
        pub fn from_env() -> anyhow::Result<Self> {
            let metals = match std::env::var("METALS") {
                Ok(s) => parse_metals(&s)?,
                Err(_) => parse_metals(DEFAULT_METALS)?,
            };

            let fetch_timeout_secs: u64 = env_parse("FETCH_TIMEOUT_SECS").unwrap_or(10);
            let crawl_budget_secs: u64 = env_parse("CRAWL_BUDGET_SECS").unwrap_or(30);
            anyhow::ensure!(fetch_timeout_secs >= 1, "FETCH_TIMEOUT_SECS must be >= 1");
            anyhow::ensure!(crawl_budget_secs >= 1, "CRAWL_BUDGET_SECS must be >= 1");

            Ok(Self {
                fetch_timeout: Duration::from_secs(fetch_timeout_secs),
                crawl_budget: Duration::from_secs(crawl_budget_secs),
                short_rate_reference: env_parse("SHORT_RATE_REFERENCE").unwrap_or(5.2),
                quote_base_url: env_or("QUOTE_BASE_URL", DEFAULT_QUOTE_BASE_URL),
                domestic_yield_symbol: env_or("DOMESTIC_YIELD_SYMBOL", "^TNX"),
                foreign_yield_url: env_or("FOREIGN_YIELD_URL", DEFAULT_FOREIGN_YIELD_URL),
                domestic_pmi_url: env_or("DOMESTIC_PMI_URL", DEFAULT_DOMESTIC_PMI_URL),
                foreign_pmi_url: env_or("FOREIGN_PMI_URL", DEFAULT_FOREIGN_PMI_URL),
                foreign_pmi_fallback_url: env_or(
                    "FOREIGN_PMI_FALLBACK_URL",
                    DEFAULT_FOREIGN_PMI_FALLBACK_URL,
                ),
                fred_base_url: env_or("FRED_BASE_URL", DEFAULT_FRED_BASE_URL),
                fred_api_key: std::env::var("FRED_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                unemployment_series: env_or("UNEMPLOYMENT_SERIES", "UNRATE"),
                metals,
            })
        }
    }

    impl Default for SourceSettings {
        fn default() -> Self {
            Self {
                fetch_timeout: Duration::from_secs(10),
                crawl_budget: Duration::from_secs(30),
                short_rate_reference: 5.2,
                quote_base_url: DEFAULT_QUOTE_BASE_URL.to_string(),
                domestic_yield_symbol: "^TNX".to_string(),
                foreign_yield_url: DEFAULT_FOREIGN_YIELD_URL.to_string(),
                domestic_pmi_url: DEFAULT_DOMESTIC_PMI_URL.to_string(),
                foreign_pmi_url: DEFAULT_FOREIGN_PMI_URL.to_string(),
                foreign_pmi_fallback_url: DEFAULT_FOREIGN_PMI_FALLBACK_URL.to_string(),
                fred_base_url: DEFAULT_FRED_BASE_URL.to_string(),
                fred_api_key: None,
                unemployment_series: "UNRATE".to_string(),
                metals: parse_metals(DEFAULT_METALS).unwrap_or_default(),
            }
        }
    }

    /// Parses `Name:SYMBOL` pairs separated by commas. Symbols may contain `=`.
    pub fn parse_metals(s: &str) -> anyhow::Result<Vec<MetalSpec>> {
        let mut out = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, symbol) = part
                .split_once(':')
                .with_context(|| format!("invalid METALS entry (expected Name:SYMBOL): {part}"))?;
            let name = name.trim();
            let symbol = symbol.trim();
            anyhow::ensure!(
                !name.is_empty() && !symbol.is_empty(),
                "invalid METALS entry (empty name or symbol): {part}"
            );
            out.push(MetalSpec {
                name: name.to_string(),
                symbol: symbol.to_string(),
            });
        }
        Ok(out)
    }

    fn env_or(key: &str, default: &str) -> String {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

}
