use crate::fetch::{FetchError, FetchResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Most recent observation with a value. Observations may come in either order;
/// missing values are published as `"."`.
pub fn latest_observation(text: &str) -> FetchResult<(String, f64)> {
    let parsed = serde_json::from_str::<ObservationsResponse>(text)
        .map_err(|e| FetchError::Parse(format!("observations response: {e}")))?;

    let (date, value) = parsed
        .observations
        .into_iter()
        .filter_map(|o| o.value.trim().parse::<f64>().ok().map(|v| (o.date, v)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .ok_or(FetchError::Empty("series has no observations"))?;

    if !value.is_finite() {
        return Err(FetchError::Parse(format!(
            "observation {date} is not a finite number: {value}"
        )));
    }
    Ok((date, value))
}
