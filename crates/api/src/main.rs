use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::FixedOffset;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use riskdash_core::dashboard::compute_dashboard;
use riskdash_core::domain::indicator::{Advice, IndicatorRecord, SourceType};
use riskdash_core::fetch::LiveSources;
use riskdash_core::ingest::upload::SECRET_HEADER;
use riskdash_core::ingest::{IngestError, UploadGate};
use riskdash_core::storage::records::{
    persist_record, MemoryRecordStore, PgRecordStore, RecordStore, StoredRecord,
};
use riskdash_core::time::display::{display_offset, format_local};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = riskdash_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store: Arc<dyn RecordStore> = match connect_store(&settings).await {
        Some(store) => store,
        None => {
            tracing::warn!("using in-memory record store; records will not survive a restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let gate = UploadGate::from_settings(&settings);
    if !gate.is_enabled() {
        tracing::warn!("UPLOAD_SECRET missing; remote uploads will be rejected");
    }

    let state = AppState {
        store,
        sources: Arc::new(LiveSources::from_settings(&settings.sources)?),
        gate,
        display_offset: display_offset(settings.display_utc_offset_hours)?,
        live_fallback: settings.live_fallback,
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/dashboard/latest", get(get_latest))
        .route("/dashboard/refresh", post(refresh))
        .route("/dashboard/upload", post(upload_file))
        .route("/api/upload", post(upload_remote))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn connect_store(
    settings: &riskdash_core::config::Settings,
) -> Option<Arc<dyn RecordStore>> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            return None;
        }
    };

    if let Err(e) = riskdash_core::storage::migrate(&pool).await {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
        return None;
    }

    Some(Arc::new(PgRecordStore::new(pool)))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn RecordStore>,
    sources: Arc<LiveSources>,
    gate: UploadGate,
    display_offset: FixedOffset,
    live_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum DataSource {
    Stored,
    Live,
    None,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardView {
    data_source: DataSource,
    last_updated: Option<String>,
    source_type: Option<SourceType>,
    advice: Advice,
    record: Option<Box<RawValue>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    id: Uuid,
    source_type: SourceType,
    record: Box<RawValue>,
}

async fn get_latest(State(state): State<AppState>) -> Result<Json<DashboardView>, ApiError> {
    let latest = state.store.latest().await.map_err(ApiError::storage)?;

    if let Some(stored) = latest {
        return Ok(Json(DashboardView {
            data_source: DataSource::Stored,
            last_updated: Some(format_local(stored.created_at, state.display_offset)),
            source_type: Some(stored.source_type),
            advice: advice_of(&stored.content),
            record: Some(stored.content),
        }));
    }

    if !state.live_fallback {
        return Ok(Json(DashboardView {
            data_source: DataSource::None,
            last_updated: None,
            source_type: None,
            advice: Advice::NoData,
            record: None,
        }));
    }

    // Empty store: show a live crawl without persisting it.
    let record = crawl(&state, SourceType::ManualCrawl).await;
    let content =
        serde_json::value::to_raw_value(&record).map_err(|e| ApiError::storage(e.into()))?;
    Ok(Json(DashboardView {
        data_source: DataSource::Live,
        last_updated: Some(format_local(record.generated_at, state.display_offset)),
        source_type: Some(record.source_type),
        advice: record.advice,
        record: Some(content),
    }))
}

async fn refresh(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let record = crawl(&state, SourceType::ManualCrawl).await;
    let stored = persist_record(state.store.as_ref(), &record)
        .await
        .map_err(ApiError::storage)?;

    Ok((StatusCode::CREATED, Json(created(stored))))
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let mut file: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            file = Some(field.bytes().await.map_err(|e| {
                ApiError::bad_request(format!("failed to read file part: {e}"))
            })?);
        }
    }

    let file = file.ok_or_else(|| ApiError::bad_request("missing multipart part `file`"))?;

    let stored = state
        .gate
        .accept_file(state.store.as_ref(), &file)
        .await?;

    Ok((StatusCode::CREATED, Json(created(stored))))
}

async fn upload_remote(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let secret = header_secret(&headers);
    let stored = state
        .gate
        .accept(
            state.store.as_ref(),
            secret.as_deref(),
            &body,
            SourceType::RemoteUpload,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created(stored))))
}

async fn crawl(state: &AppState, source_type: SourceType) -> IndicatorRecord {
    compute_dashboard(state.sources.as_ref(), state.sources.settings(), source_type).await
}

fn created(stored: StoredRecord) -> CreatedResponse {
    CreatedResponse {
        id: stored.id,
        source_type: stored.source_type,
        record: stored.content,
    }
}

fn header_secret(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Uploaded documents may be lenient-validated, so advice can be missing or unrecognised.
fn advice_of(content: &RawValue) -> Advice {
    serde_json::from_str::<Value>(content.get())
        .ok()
        .and_then(|doc| doc.get("advice").cloned())
        .and_then(|v| serde_json::from_value::<Advice>(v).ok())
        .unwrap_or(Advice::NoData)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn storage(err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "storage failure");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "failed to store or load dashboard record".to_string(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Unauthorized => Self {
                status: StatusCode::UNAUTHORIZED,
                message: err.to_string(),
            },
            IngestError::MalformedJson(_) | IngestError::NotAnObject => Self {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            },
            IngestError::Schema(_) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: err.to_string(),
            },
            IngestError::Persistence(inner) => Self::storage(inner),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &riskdash_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
