use crate::config::Settings;
use crate::domain::contract::validate_record_document;
use crate::domain::indicator::SourceType;
use crate::storage::records::{RecordStore, StoredRecord};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;
use serde_json::Value;
use std::fmt;

pub const SECRET_HEADER: &str = "x-upload-secret";

const SOURCE_TYPE_KEY: &str = "sourceType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Document must deserialize as an indicator record with a consistent total.
    Strict,
    /// Any JSON object is accepted.
    #[default]
    Lenient,
}

impl std::str::FromStr for ValidationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationPolicy::Strict),
            "lenient" => Ok(ValidationPolicy::Lenient),
            other => anyhow::bail!("UPLOAD_VALIDATION must be strict or lenient (got {other:?})"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing or invalid upload secret")]
    Unauthorized,

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("document rejected: {0}")]
    Schema(String),

    #[error("failed to store record")]
    Persistence(#[source] anyhow::Error),
}

/// Shared-secret check plus document preparation for externally produced records.
#[derive(Debug, Clone)]
pub struct UploadGate {
    secret: Option<String>,
    policy: ValidationPolicy,
}

impl UploadGate {
    pub fn new(secret: Option<String>, policy: ValidationPolicy) -> Self {
        Self { secret, policy }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.upload_secret.clone(), settings.upload_validation)
    }

    /// Without a configured secret every remote upload is refused.
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn authorize(&self, presented: Option<&str>) -> Result<(), IngestError> {
        match (self.secret.as_deref(), presented) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(IngestError::Unauthorized),
        }
    }

    /// Returns the submitted text with `sourceType` set. Every other byte is kept as sent
    /// unless the document already carried a `sourceType`, in which case members are
    /// re-joined compactly around the replaced value.
    pub fn prepare(
        &self,
        body: &[u8],
        source_type: SourceType,
    ) -> Result<Box<RawValue>, IngestError> {
        let text =
            std::str::from_utf8(body).map_err(|e| IngestError::MalformedJson(e.to_string()))?;
        let doc: Value =
            serde_json::from_str(text).map_err(|e| IngestError::MalformedJson(e.to_string()))?;
        let obj = doc.as_object().ok_or(IngestError::NotAnObject)?;

        if self.policy == ValidationPolicy::Strict {
            let mut stamped = obj.clone();
            stamped.insert(
                SOURCE_TYPE_KEY.to_string(),
                Value::String(source_type.as_str().to_string()),
            );
            validate_record_document(&Value::Object(stamped))
                .map_err(|e| IngestError::Schema(format!("{e:#}")))?;
        }

        let stamped = if obj.contains_key(SOURCE_TYPE_KEY) {
            replace_source_type(text, source_type)?
        } else {
            append_source_type(text, obj.is_empty(), source_type)
        };

        RawValue::from_string(stamped).map_err(|e| IngestError::MalformedJson(e.to_string()))
    }

    /// Remote uploads: the shared secret must match.
    pub async fn accept(
        &self,
        store: &dyn RecordStore,
        presented_secret: Option<&str>,
        body: &[u8],
        source_type: SourceType,
    ) -> Result<StoredRecord, IngestError> {
        if let Err(err) = self.authorize(presented_secret) {
            tracing::warn!(%source_type, has_secret = presented_secret.is_some(), "upload rejected: unauthorized");
            return Err(err);
        }

        self.store_document(store, body, source_type).await
    }

    /// Dashboard file uploads are not gated by the shared secret.
    pub async fn accept_file(
        &self,
        store: &dyn RecordStore,
        body: &[u8],
    ) -> Result<StoredRecord, IngestError> {
        self.store_document(store, body, SourceType::FileUpload).await
    }

    async fn store_document(
        &self,
        store: &dyn RecordStore,
        body: &[u8],
        source_type: SourceType,
    ) -> Result<StoredRecord, IngestError> {
        let doc = self.prepare(body, source_type).inspect_err(|err| {
            tracing::warn!(%source_type, error = %err, "upload rejected");
        })?;

        let stored = store
            .append(source_type, doc)
            .await
            .map_err(IngestError::Persistence)?;

        tracing::info!(%source_type, record_id = %stored.id, "upload stored");
        Ok(stored)
    }
}

/// `text` must already be a valid JSON object.
fn append_source_type(text: &str, empty: bool, source_type: SourceType) -> String {
    let trimmed = text.trim();
    let inner = trimmed.strip_suffix('}').unwrap_or(trimmed).trim_end();
    let sep = if empty { "" } else { "," };
    format!(
        "{inner}{sep}\"{SOURCE_TYPE_KEY}\":\"{}\"}}",
        source_type.as_str()
    )
}

fn replace_source_type(text: &str, source_type: SourceType) -> Result<String, IngestError> {
    let RawMembers(members) =
        serde_json::from_str(text).map_err(|e| IngestError::MalformedJson(e.to_string()))?;
    let tag = Value::String(source_type.as_str().to_string()).to_string();

    let mut parts = Vec::with_capacity(members.len());
    let mut seen = false;
    for (key, value) in &members {
        if key == SOURCE_TYPE_KEY {
            if seen {
                continue;
            }
            seen = true;
            parts.push(format!("\"{SOURCE_TYPE_KEY}\":{tag}"));
        } else {
            let key = Value::String(key.clone()).to_string();
            parts.push(format!("{key}:{}", value.get()));
        }
    }
    Ok(format!("{{{}}}", parts.join(",")))
}

/// Top-level members of an object with each value kept as raw text.
struct RawMembers(Vec<(String, Box<RawValue>)>);

impl<'de> Deserialize<'de> for RawMembers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = RawMembers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawMembers, A::Error> {
                let mut members = Vec::new();
                while let Some(entry) = map.next_entry::<String, Box<RawValue>>()? {
                    members.push(entry);
                }
                Ok(RawMembers(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::MemoryRecordStore;
    use serde_json::json;

    const SECRET: &str = "s3cret";

    fn gate(policy: ValidationPolicy) -> UploadGate {
        UploadGate::new(Some(SECRET.to_string()), policy)
    }

    fn document() -> Value {
        json!({
            "yieldSpread": {"us10y": 4.0, "jp10y": 1.5, "spread": 2.5, "status": "Safe"},
            "metals": [],
            "riskItems": [
                {"label": "US PMI (ISM)", "value": 48.7, "score": 1, "status": "Warning"},
                {"label": "China PMI", "value": 49.2, "score": "-", "status": "Warning"}
            ],
            "totalScore": 1,
            "advice": "Safe",
            "generatedAt": "2026-10-16T01:00:00Z",
            "desktopVersion": "2.3.1"
        })
    }

    fn parsed(raw: &RawValue) -> Value {
        serde_json::from_str(raw.get()).unwrap()
    }

    #[test]
    fn secret_must_match_exactly() {
        let g = gate(ValidationPolicy::Strict);
        assert!(g.authorize(Some(SECRET)).is_ok());
        assert!(matches!(g.authorize(Some("S3CRET")), Err(IngestError::Unauthorized)));
        assert!(matches!(g.authorize(Some("s3cret ")), Err(IngestError::Unauthorized)));
        assert!(matches!(g.authorize(None), Err(IngestError::Unauthorized)));
    }

    #[test]
    fn unconfigured_gate_refuses_everything() {
        let g = UploadGate::new(None, ValidationPolicy::Lenient);
        assert!(!g.is_enabled());
        assert!(g.authorize(Some("")).is_err());
    }

    #[test]
    fn default_policy_accepts_producer_shaped_documents() {
        let g = UploadGate::new(Some(SECRET.to_string()), ValidationPolicy::default());
        let body = json!({
            "us_jp_spread": {"us10y": 4.05, "jp10y": 0.98, "spread": 3.07, "status": "Safe"},
            "mark17": [{"name": "Gold", "price": 2650.1, "drop": 3.2, "status": "Safe"}],
            "total_score": 4,
            "advice": "Safe"
        })
        .to_string();

        let doc = g.prepare(body.as_bytes(), SourceType::RemoteUpload).unwrap();
        assert_eq!(parsed(&doc)["total_score"], json!(4));
        assert_eq!(parsed(&doc)["sourceType"], json!("RemoteUpload"));
    }

    #[test]
    fn prepare_appends_source_type_and_keeps_the_rest() {
        let g = gate(ValidationPolicy::Strict);
        let body = serde_json::to_vec(&document()).unwrap();
        let doc = g.prepare(&body, SourceType::FileUpload).unwrap();

        let mut expected = document();
        expected["sourceType"] = json!("FileUpload");
        assert_eq!(parsed(&doc), expected);
        assert!(doc.get().ends_with(r#","sourceType":"FileUpload"}"#));
    }

    #[test]
    fn prepare_keeps_submitted_number_text() {
        let g = gate(ValidationPolicy::Lenient);
        let body = br#"{"a":4.30,"b":12345678901234567890123,"c":1e2}"#;
        let doc = g.prepare(body, SourceType::RemoteUpload).unwrap();
        assert_eq!(
            doc.get(),
            r#"{"a":4.30,"b":12345678901234567890123,"c":1e2,"sourceType":"RemoteUpload"}"#
        );
    }

    #[test]
    fn prepare_keeps_formatting_of_pretty_documents() {
        let g = gate(ValidationPolicy::Lenient);
        let doc = g
            .prepare(b"  {\n  \"a\": 1.50\n}\n", SourceType::FileUpload)
            .unwrap();
        assert_eq!(doc.get(), "{\n  \"a\": 1.50,\"sourceType\":\"FileUpload\"}");

        let empty = g.prepare(b"{ }", SourceType::FileUpload).unwrap();
        assert_eq!(empty.get(), r#"{"sourceType":"FileUpload"}"#);
    }

    #[test]
    fn prepare_overwrites_claimed_source_type() {
        let g = gate(ValidationPolicy::Lenient);
        let doc = g
            .prepare(
                br#"{"sourceType":"ScheduledCrawl", "a":1.0,"sourceType":"x"}"#,
                SourceType::RemoteUpload,
            )
            .unwrap();
        assert_eq!(doc.get(), r#"{"sourceType":"RemoteUpload","a":1.0}"#);
    }

    #[test]
    fn malformed_and_non_object_bodies_are_rejected() {
        let g = gate(ValidationPolicy::Lenient);
        assert!(matches!(
            g.prepare(b"{not json", SourceType::FileUpload),
            Err(IngestError::MalformedJson(_))
        ));
        assert!(matches!(
            g.prepare(b"[1,2,3]", SourceType::FileUpload),
            Err(IngestError::NotAnObject)
        ));
        assert!(matches!(
            g.prepare(&[0xff, 0xfe, b'{', b'}'], SourceType::FileUpload),
            Err(IngestError::MalformedJson(_))
        ));
    }

    #[test]
    fn strict_policy_rejects_foreign_shapes() {
        let body = br#"{"hello":"world"}"#;
        assert!(matches!(
            gate(ValidationPolicy::Strict).prepare(body, SourceType::RemoteUpload),
            Err(IngestError::Schema(_))
        ));
        assert!(gate(ValidationPolicy::Lenient)
            .prepare(body, SourceType::RemoteUpload)
            .is_ok());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("Strict".parse::<ValidationPolicy>().unwrap(), ValidationPolicy::Strict);
        assert_eq!(" lenient".parse::<ValidationPolicy>().unwrap(), ValidationPolicy::Lenient);
        assert!("loose".parse::<ValidationPolicy>().is_err());
        assert_eq!(ValidationPolicy::default(), ValidationPolicy::Lenient);
    }

    #[tokio::test]
    async fn wrong_secret_stores_nothing_then_correct_secret_stores_once() {
        let store = MemoryRecordStore::new();
        let g = gate(ValidationPolicy::Strict);
        let body = serde_json::to_vec(&document()).unwrap();

        let rejected = g
            .accept(&store, Some("guess"), &body, SourceType::RemoteUpload)
            .await;
        assert!(matches!(rejected, Err(IngestError::Unauthorized)));
        assert!(store.latest().await.unwrap().is_none());

        let stored = g
            .accept(&store, Some(SECRET), &body, SourceType::RemoteUpload)
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, stored.id);
        assert_eq!(latest.source_type, SourceType::RemoteUpload);

        let mut expected = document();
        expected["sourceType"] = json!("RemoteUpload");
        assert_eq!(
            latest.content.get(),
            serde_json::to_string(&expected).unwrap()
        );
    }

    #[tokio::test]
    async fn stored_text_matches_submitted_text() {
        let store = MemoryRecordStore::new();
        let body = br#"{"score":7.10,"big":98765432109876543210,"exp":2.5E-3}"#;
        gate(ValidationPolicy::Lenient)
            .accept(&store, Some(SECRET), body, SourceType::RemoteUpload)
            .await
            .unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(
            latest.content.get(),
            r#"{"score":7.10,"big":98765432109876543210,"exp":2.5E-3,"sourceType":"RemoteUpload"}"#
        );
    }

    #[tokio::test]
    async fn file_upload_needs_no_secret() {
        let store = MemoryRecordStore::new();
        let g = UploadGate::new(None, ValidationPolicy::Lenient);
        let stored = g.accept_file(&store, br#"{"a":1}"#).await.unwrap();

        assert_eq!(stored.source_type, SourceType::FileUpload);
        assert_eq!(stored.content.get(), r#"{"a":1,"sourceType":"FileUpload"}"#);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn malformed_upload_is_not_persisted() {
        let store = MemoryRecordStore::new();
        let res = gate(ValidationPolicy::Strict)
            .accept(&store, Some(SECRET), b"{\"totalScore\":", SourceType::FileUpload)
            .await;
        assert!(matches!(res, Err(IngestError::MalformedJson(_))));
        assert_eq!(store.len().await, 0);
    }
}
