use crate::domain::indicator::{sum_scores, IndicatorRecord};
use anyhow::{ensure, Context};
use serde_json::Value;

/// Checks an externally produced document against the record schema.
///
/// The document is only inspected; callers persist the original JSON, not the parsed form.
pub fn validate_record_document(doc: &Value) -> anyhow::Result<IndicatorRecord> {
    let record = serde_json::from_value::<IndicatorRecord>(doc.clone())
        .context("document does not match the indicator record schema")?;
    record.validate()?;
    Ok(record)
}

impl IndicatorRecord {
    pub fn validate(&self) -> anyhow::Result<()> {
        let expected = sum_scores(&self.risk_items);
        ensure!(
            self.total_score == expected,
            "totalScore mismatch: expected {expected} from riskItems, got {}",
            self.total_score
        );

        for metal in &self.metals {
            ensure!(!metal.name.trim().is_empty(), "metal name must be non-empty");
            ensure!(
                metal.current_price.is_finite() && metal.drawdown_pct.is_finite(),
                "metal {} has non-finite values",
                metal.name
            );
        }

        for item in &self.risk_items {
            ensure!(!item.label.trim().is_empty(), "risk item label must be non-empty");
        }

        Ok(())
    }
}
