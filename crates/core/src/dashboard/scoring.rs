use crate::domain::indicator::{
    round2, sum_scores, Advice, IndicatorRecord, ItemScore, ItemValue, MetalReading, RiskItem,
    SourceType, Status, YieldSpread,
};
use crate::fetch::{FetchResult, PriceHistory};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const SPREAD_DANGER_BELOW: f64 = 2.0;
pub const DRAWDOWN_DANGER_PCT: f64 = 50.0;
pub const PMI_CONTRACTION_BELOW: f64 = 50.0;
pub const UNEMPLOYMENT_DANGER_ABOVE: f64 = 4.5;
pub const UNEMPLOYMENT_WARNING_ABOVE: f64 = 4.0;

const PMI_SCORE: i32 = 1;
const UNEMPLOYMENT_DANGER_SCORE: i32 = 3;
const UNEMPLOYMENT_WARNING_SCORE: i32 = 1;
const INVERSION_SCORE: i32 = 3;

pub const LABEL_DOMESTIC_PMI: &str = "US PMI (ISM)";
pub const LABEL_FOREIGN_PMI: &str = "China PMI";
pub const LABEL_UNEMPLOYMENT: &str = "US Unemployment Rate";
pub const LABEL_INVERSION: &str = "Yield Curve Inversion (10Y-3M)";

/// Whatever the fetchers produced for one run, failures included.
#[derive(Debug, Clone)]
pub struct RawReadings {
    pub us10y: FetchResult<f64>,
    pub jp10y: FetchResult<f64>,
    pub metals: Vec<(String, FetchResult<PriceHistory>)>,
    pub us_pmi: FetchResult<f64>,
    pub cn_pmi: FetchResult<f64>,
    pub unemployment: FetchResult<f64>,
}

/// Status is decided on the unrounded spread.
pub fn yield_spread(us10y: f64, jp10y: f64) -> YieldSpread {
    let spread = us10y - jp10y;
    let status = if spread < SPREAD_DANGER_BELOW && us10y > 0.0 {
        Status::Danger
    } else {
        Status::Safe
    };
    YieldSpread {
        us10y: round2(us10y),
        jp10y: round2(jp10y),
        spread: round2(spread),
        status,
    }
}

pub fn metal_reading(name: &str, history: &FetchResult<PriceHistory>) -> MetalReading {
    match history.as_ref().map_err(|e| e.clone()).and_then(|h| h.drawdown_pct()) {
        Ok((close, drawdown)) => MetalReading {
            name: name.to_string(),
            current_price: round2(close),
            drawdown_pct: round2(drawdown),
            status: if drawdown >= DRAWDOWN_DANGER_PCT {
                Status::Danger
            } else {
                Status::Safe
            },
        },
        Err(_) => MetalReading {
            name: name.to_string(),
            current_price: 0.0,
            drawdown_pct: 0.0,
            status: Status::Unknown,
        },
    }
}

/// `pmi <= 0` means unavailable. Only the scored item contributes to the total.
pub fn pmi_item(label: &str, pmi: f64, scored: bool) -> RiskItem {
    let contracting = pmi > 0.0 && pmi < PMI_CONTRACTION_BELOW;
    let status = if contracting { Status::Warning } else { Status::Safe };
    let score = match (scored, contracting) {
        (false, _) => ItemScore::NotScored,
        (true, true) => ItemScore::Points(PMI_SCORE),
        (true, false) => ItemScore::Points(0),
    };
    let value = if pmi > 0.0 {
        ItemValue::Number(round2(pmi))
    } else {
        ItemValue::not_available()
    };

    RiskItem {
        label: label.to_string(),
        value,
        score,
        status,
    }
}

pub fn unemployment_item(rate: Option<f64>) -> RiskItem {
    let Some(rate) = rate else {
        return RiskItem {
            label: LABEL_UNEMPLOYMENT.to_string(),
            value: ItemValue::not_available(),
            score: ItemScore::Points(0),
            status: Status::Unknown,
        };
    };

    let (score, status) = if rate > UNEMPLOYMENT_DANGER_ABOVE {
        (UNEMPLOYMENT_DANGER_SCORE, Status::Danger)
    } else if rate > UNEMPLOYMENT_WARNING_ABOVE {
        (UNEMPLOYMENT_WARNING_SCORE, Status::Warning)
    } else {
        (0, Status::Safe)
    };

    RiskItem {
        label: LABEL_UNEMPLOYMENT.to_string(),
        value: ItemValue::Text(format!("{}%", round2(rate))),
        score: ItemScore::Points(score),
        status,
    }
}

/// Long yield against the configured short-rate reference.
pub fn inversion_item(long_yield: f64, short_rate: f64) -> RiskItem {
    let spread = long_yield - short_rate;
    let inverted = spread < 0.0 && long_yield > 0.0;
    RiskItem {
        label: LABEL_INVERSION.to_string(),
        value: ItemValue::Number(round2(spread)),
        score: ItemScore::Points(if inverted { INVERSION_SCORE } else { 0 }),
        status: if inverted { Status::Danger } else { Status::Safe },
    }
}

pub fn build_record(
    raw: &RawReadings,
    short_rate: f64,
    source_type: SourceType,
    generated_at: DateTime<Utc>,
) -> IndicatorRecord {
    let mut raw_indicators = BTreeMap::new();
    let mut fetch_failures = BTreeMap::new();

    let mut take = |key: &str, r: &FetchResult<f64>| -> Option<f64> {
        match r {
            Ok(v) => {
                raw_indicators.insert(key.to_string(), *v);
                Some(*v)
            }
            Err(err) => {
                fetch_failures.insert(key.to_string(), err.to_string());
                None
            }
        }
    };

    let us10y = take("us10y", &raw.us10y);
    let jp10y = take("jp10y", &raw.jp10y);
    let us_pmi = take("usPmi", &raw.us_pmi);
    let cn_pmi = take("cnPmi", &raw.cn_pmi);
    let unemployment = take("unemploymentRate", &raw.unemployment);

    let mut metals = Vec::with_capacity(raw.metals.len());
    for (name, history) in &raw.metals {
        let key = name.to_ascii_lowercase();
        match history {
            Ok(h) => {
                if let Some(c) = h.last_close() {
                    raw_indicators.insert(format!("{key}.close"), c);
                }
                if let Some(hi) = h.max_high() {
                    raw_indicators.insert(format!("{key}.high6m"), hi);
                }
                if let Err(err) = h.drawdown_pct() {
                    fetch_failures.insert(key, err.to_string());
                }
            }
            Err(err) => {
                fetch_failures.insert(key, err.to_string());
            }
        }
        metals.push(metal_reading(name, history));
    }
    raw_indicators.insert("shortRateReference".to_string(), short_rate);

    let us10y = us10y.unwrap_or(0.0);
    let risk_items = vec![
        pmi_item(LABEL_DOMESTIC_PMI, us_pmi.unwrap_or(0.0), true),
        pmi_item(LABEL_FOREIGN_PMI, cn_pmi.unwrap_or(0.0), false),
        unemployment_item(unemployment),
        inversion_item(us10y, short_rate),
    ];
    let total_score = sum_scores(&risk_items);

    IndicatorRecord {
        yield_spread: yield_spread(us10y, jp10y.unwrap_or(0.0)),
        metals,
        risk_items,
        total_score,
        advice: Advice::from_total_score(total_score),
        raw_indicators,
        fetch_failures,
        generated_at,
        source_type,
    }
}
