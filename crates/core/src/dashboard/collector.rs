use crate::config::SourceSettings;
use crate::dashboard::scoring::{build_record, RawReadings};
use crate::domain::indicator::{IndicatorRecord, SourceType};
use crate::fetch::{FetchError, FetchResult, IndicatorSources};
use chrono::Utc;
use std::future::Future;
use tokio::time::Instant;

/// Runs every fetch concurrently under one shared deadline and scores the result.
///
/// Never fails: a source that errors or misses the deadline degrades to its sentinel and is
/// listed in `fetchFailures`.
pub async fn compute_dashboard(
    sources: &dyn IndicatorSources,
    settings: &SourceSettings,
    source_type: SourceType,
) -> IndicatorRecord {
    let t0 = std::time::Instant::now();
    let deadline = Instant::now() + settings.crawl_budget;

    let metals = futures::future::join_all(settings.metals.iter().map(|metal| async move {
        let history = within(deadline, sources.metal_history(metal)).await;
        (metal.name.clone(), history)
    }));

    let (us10y, jp10y, us_pmi, cn_pmi, unemployment, metals) = tokio::join!(
        within(deadline, sources.domestic_long_yield()),
        within(deadline, sources.foreign_long_yield()),
        within(deadline, sources.domestic_pmi()),
        within(deadline, sources.foreign_pmi()),
        within(deadline, sources.unemployment_rate()),
        metals,
    );

    let raw = RawReadings {
        us10y,
        jp10y,
        metals,
        us_pmi,
        cn_pmi,
        unemployment,
    };

    let record = build_record(&raw, settings.short_rate_reference, source_type, Utc::now());

    for (source, reason) in &record.fetch_failures {
        tracing::warn!(%source, %reason, "indicator fetch failed; using sentinel");
    }
    tracing::info!(
        %source_type,
        total_score = record.total_score,
        advice = ?record.advice,
        failures = record.fetch_failures.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "dashboard computed"
    );

    record
}

async fn within<T>(deadline: Instant, fut: impl Future<Output = FetchResult<T>>) -> FetchResult<T> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .unwrap_or_else(|_| Err(FetchError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetalSpec;
    use crate::domain::indicator::{Advice, ItemScore, Status};
    use crate::fetch::PriceHistory;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct StubSources {
        us10y: FetchResult<f64>,
        jp10y: FetchResult<f64>,
        history: FetchResult<PriceHistory>,
        us_pmi: FetchResult<f64>,
        cn_pmi: FetchResult<f64>,
        unemployment: FetchResult<f64>,
        slow_unemployment: bool,
    }

    impl StubSources {
        fn failing() -> Self {
            Self {
                us10y: Err(FetchError::Request("connection refused".into())),
                jp10y: Err(FetchError::Request("connection refused".into())),
                history: Err(FetchError::Request("connection refused".into())),
                us_pmi: Err(FetchError::HttpStatus { status: 403 }),
                cn_pmi: Err(FetchError::HttpStatus { status: 403 }),
                unemployment: Err(FetchError::NotConfigured("FRED_API_KEY")),
                slow_unemployment: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl IndicatorSources for StubSources {
        async fn domestic_long_yield(&self) -> FetchResult<f64> {
            self.us10y.clone()
        }

        async fn foreign_long_yield(&self) -> FetchResult<f64> {
            self.jp10y.clone()
        }

        async fn metal_history(&self, _metal: &MetalSpec) -> FetchResult<PriceHistory> {
            self.history.clone()
        }

        async fn domestic_pmi(&self) -> FetchResult<f64> {
            self.us_pmi.clone()
        }

        async fn foreign_pmi(&self) -> FetchResult<f64> {
            self.cn_pmi.clone()
        }

        async fn unemployment_rate(&self) -> FetchResult<f64> {
            if self.slow_unemployment {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            self.unemployment.clone()
        }
    }

    #[tokio::test]
    async fn all_sources_down_gives_safe_empty_record() {
        let settings = SourceSettings::default();
        let record =
            compute_dashboard(&StubSources::failing(), &settings, SourceType::ScheduledCrawl).await;

        assert_eq!(record.total_score, 0);
        assert_eq!(record.advice, Advice::Safe);
        assert_eq!(record.metals.len(), settings.metals.len());
        assert!(record.metals.iter().all(|m| m.status == Status::Unknown));
        assert_eq!(record.source_type, SourceType::ScheduledCrawl);
        assert!(record.fetch_failures.contains_key("gold"));
    }

    #[tokio::test]
    async fn metals_keep_configured_order() {
        let mut stub = StubSources::failing();
        stub.history = Ok(PriceHistory {
            highs: vec![100.0],
            closes: vec![40.0],
        });
        let settings = SourceSettings::default();
        let record = compute_dashboard(&stub, &settings, SourceType::ManualCrawl).await;

        let names: Vec<_> = record.metals.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Gold", "Silver", "Copper"]);
        assert!(record.metals.iter().all(|m| m.status == Status::Danger));
        assert!(record.metals.iter().all(|m| m.drawdown_pct == 60.0));
    }

    #[tokio::test]
    async fn full_readings_are_scored() {
        let stub = StubSources {
            us10y: Ok(1.0),
            jp10y: Ok(0.5),
            history: Err(FetchError::Empty("chart history is empty")),
            us_pmi: Ok(48.0),
            cn_pmi: Ok(49.0),
            unemployment: Ok(4.6),
            slow_unemployment: false,
        };
        let record =
            compute_dashboard(&stub, &SourceSettings::default(), SourceType::ManualCrawl).await;

        assert_eq!(record.yield_spread.status, Status::Danger);
        assert_eq!(record.risk_items[2].score, ItemScore::Points(3));
        assert_eq!(record.total_score, 7);
        assert_eq!(record.advice, Advice::Caution);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out_without_blocking_the_rest() {
        let mut stub = StubSources::failing();
        stub.us10y = Ok(4.0);
        stub.unemployment = Ok(4.6);
        stub.slow_unemployment = true;

        let mut settings = SourceSettings::default();
        settings.crawl_budget = Duration::from_secs(5);

        let record = compute_dashboard(&stub, &settings, SourceType::ScheduledCrawl).await;

        assert_eq!(record.yield_spread.us10y, 4.0);
        assert_eq!(record.risk_items[2].status, Status::Unknown);
        assert_eq!(
            record.fetch_failures.get("unemploymentRate").map(String::as_str),
            Some("timed out")
        );
    }
}
