use crate::domain::indicator::{IndicatorRecord, SourceType};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use uuid::Uuid;

/// `content` is the stored JSON text exactly as it was appended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: Uuid,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
    pub content: Box<RawValue>,
}

/// Append-only record storage. Nothing is updated or deleted.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(
        &self,
        source_type: SourceType,
        content: Box<RawValue>,
    ) -> anyhow::Result<StoredRecord>;

    /// Most recently created record, if any.
    async fn latest(&self) -> anyhow::Result<Option<StoredRecord>>;
}

/// Stores a freshly computed record under its own `sourceType`.
pub async fn persist_record(
    store: &dyn RecordStore,
    record: &IndicatorRecord,
) -> anyhow::Result<StoredRecord> {
    let content =
        serde_json::value::to_raw_value(record).context("serialize indicator record failed")?;
    store.append(record.source_type, content).await
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: sqlx::PgPool,
}

impl PgRecordStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecordStore for PgRecordStore {
    async fn append(
        &self,
        source_type: SourceType,
        content: Box<RawValue>,
    ) -> anyhow::Result<StoredRecord> {
        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO dashboard_records (id, source_type, content) \
             VALUES ($1, $2, $3) \
             RETURNING id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(source_type.as_str())
        .bind(content.get())
        .fetch_one(&self.pool)
        .await
        .context("insert dashboard_records failed")?;

        Ok(StoredRecord {
            id,
            source_type,
            created_at,
            content,
        })
    }

    async fn latest(&self) -> anyhow::Result<Option<StoredRecord>> {
        let row = sqlx::query_as::<_, (Uuid, String, String, DateTime<Utc>)>(
            "SELECT id, source_type, content, created_at \
             FROM dashboard_records \
             ORDER BY created_at DESC, seq DESC \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("select latest dashboard_records failed")?;

        let Some((id, source_type, content, created_at)) = row else {
            return Ok(None);
        };

        let content = RawValue::from_string(content)
            .with_context(|| format!("stored content is not valid JSON (id={id})"))?;

        Ok(Some(StoredRecord {
            id,
            source_type: source_type.parse()?,
            created_at,
            content,
        }))
    }
}

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: tokio::sync::RwLock<Vec<StoredRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append(
        &self,
        source_type: SourceType,
        content: Box<RawValue>,
    ) -> anyhow::Result<StoredRecord> {
        let record = StoredRecord {
            id: Uuid::new_v4(),
            source_type,
            created_at: Utc::now(),
            content,
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn latest(&self) -> anyhow::Result<Option<StoredRecord>> {
        Ok(self.records.read().await.last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::scoring::{build_record, RawReadings};
    use crate::fetch::FetchError;

    fn raw(text: &str) -> Box<RawValue> {
        RawValue::from_string(text.to_string()).unwrap()
    }

    #[tokio::test]
    async fn latest_is_the_last_appended() {
        let store = MemoryRecordStore::new();
        assert!(store.latest().await.unwrap().is_none());

        store
            .append(SourceType::ScheduledCrawl, raw(r#"{"n":1}"#))
            .await
            .unwrap();
        let second = store
            .append(SourceType::FileUpload, raw(r#"{"n": 2.0}"#))
            .await
            .unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.source_type, SourceType::FileUpload);
        assert_eq!(latest.content.get(), r#"{"n": 2.0}"#);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn persisted_record_reads_back_unchanged() {
        let raw = RawReadings {
            us10y: Ok(4.0),
            jp10y: Ok(1.5),
            metals: vec![],
            us_pmi: Ok(51.0),
            cn_pmi: Err(FetchError::Timeout),
            unemployment: Ok(4.1),
        };
        let record = build_record(&raw, 5.2, SourceType::ManualCrawl, Utc::now());

        let store = MemoryRecordStore::new();
        let stored = persist_record(&store, &record).await.unwrap();
        assert_eq!(stored.source_type, SourceType::ManualCrawl);

        let latest = store.latest().await.unwrap().unwrap();
        let back: IndicatorRecord = serde_json::from_str(latest.content.get()).unwrap();
        assert_eq!(back, record);
    }
}
