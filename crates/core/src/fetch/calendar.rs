use regex::Regex;
use std::sync::LazyLock;

static ACTUAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""actual":\s*"?(\d+\.\d+)"?"#).expect("valid actual regex")
});
static NEWS_PMI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PMI.*?(\d{2}\.\d)").expect("valid news PMI regex"));

/// Last `"actual": <number>` on an economic-calendar page.
pub fn last_actual_value(text: &str) -> Option<f64> {
    ACTUAL_RE
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .last()
}

/// First number shaped like `dd.d` following the token `PMI` on the same line.
pub fn first_news_pmi(text: &str) -> Option<f64> {
    NEWS_PMI_RE
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
}
