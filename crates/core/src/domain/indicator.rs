use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// One dashboard snapshot. Never mutated after creation; a refresh produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorRecord {
    pub yield_spread: YieldSpread,
    pub metals: Vec<MetalReading>,
    pub risk_items: Vec<RiskItem>,
    pub total_score: i32,
    pub advice: Advice,
    #[serde(default)]
    pub raw_indicators: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fetch_failures: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldSpread {
    pub us10y: f64,
    pub jp10y: f64,
    pub spread: f64,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetalReading {
    pub name: String,
    pub current_price: f64,
    pub drawdown_pct: f64,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    pub label: String,
    pub value: ItemValue,
    pub score: ItemScore,
    pub status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Safe,
    Warning,
    Danger,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advice {
    Safe,
    Caution,
    Reduce,
    NoData,
}

impl Advice {
    pub fn from_total_score(total_score: i32) -> Self {
        if total_score >= 12 {
            Advice::Reduce
        } else if total_score >= 6 {
            Advice::Caution
        } else {
            Advice::Safe
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    ScheduledCrawl,
    ManualCrawl,
    FileUpload,
    RemoteUpload,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ScheduledCrawl => "ScheduledCrawl",
            SourceType::ManualCrawl => "ManualCrawl",
            SourceType::FileUpload => "FileUpload",
            SourceType::RemoteUpload => "RemoteUpload",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ScheduledCrawl" => Ok(SourceType::ScheduledCrawl),
            "ManualCrawl" => Ok(SourceType::ManualCrawl),
            "FileUpload" => Ok(SourceType::FileUpload),
            "RemoteUpload" => Ok(SourceType::RemoteUpload),
            other => anyhow::bail!("unknown source type: {other}"),
        }
    }
}

/// Display value of a risk item: a rounded number, or text such as `"4.3%"` / `"N/A"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Number(f64),
    Text(String),
}

impl ItemValue {
    pub const NOT_AVAILABLE: &'static str = "N/A";

    pub fn not_available() -> Self {
        ItemValue::Text(Self::NOT_AVAILABLE.to_string())
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, ItemValue::Text(s) if s == Self::NOT_AVAILABLE)
    }
}

/// Score contribution of a risk item. `NotScored` serializes as `"-"` and is excluded from totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemScore {
    Points(i32),
    NotScored,
}

impl ItemScore {
    const NOT_SCORED: &'static str = "-";

    pub fn points(&self) -> Option<i32> {
        match self {
            ItemScore::Points(p) => Some(*p),
            ItemScore::NotScored => None,
        }
    }
}

impl Serialize for ItemScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ItemScore::Points(p) => serializer.serialize_i32(*p),
            ItemScore::NotScored => serializer.serialize_str(Self::NOT_SCORED),
        }
    }
}

impl<'de> Deserialize<'de> for ItemScore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(p) => Ok(ItemScore::Points(p)),
            Raw::Text(s) if s == ItemScore::NOT_SCORED => Ok(ItemScore::NotScored),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "score must be an integer or \"-\" (got {s:?})"
            ))),
        }
    }
}

/// Sum of the numeric scores; `"-"` entries are skipped.
pub fn sum_scores(items: &[RiskItem]) -> i32 {
    items.iter().filter_map(|i| i.score.points()).sum()
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
