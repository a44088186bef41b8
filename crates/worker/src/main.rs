use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskdash_core::dashboard::compute_dashboard;
use riskdash_core::domain::indicator::SourceType;
use riskdash_core::fetch::LiveSources;
use riskdash_core::storage::records::{persist_record, PgRecordStore};

#[derive(Debug, Parser)]
#[command(name = "riskdash_worker")]
struct Args {
    /// Compute the dashboard and print it instead of writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Provenance tag written on the record.
    #[arg(long, value_enum, default_value_t = CrawlKind::Scheduled)]
    source_type: CrawlKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CrawlKind {
    Scheduled,
    Manual,
}

impl From<CrawlKind> for SourceType {
    fn from(kind: CrawlKind) -> Self {
        match kind {
            CrawlKind::Scheduled => SourceType::ScheduledCrawl,
            CrawlKind::Manual => SourceType::ManualCrawl,
        }
    }
}

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

    let args = Args::parse();
    let source_type = SourceType::from(args.source_type);
    let sources = LiveSources::from_settings(&settings.sources)?;

    if args.dry_run {
        let record = compute_dashboard(&sources, &settings.sources, source_type).await;
        let json = serde_json::to_string_pretty(&record).context("serialize record failed")?;
        println!("{json}");
        tracing::info!(dry_run = true, total_score = record.total_score, "crawl finished (dry-run)");
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    riskdash_core::storage::migrate(&pool).await?;

    // Hold one connection for the whole run; the advisory lock belongs to it.
    let mut lock_conn = pool.acquire().await.context("acquire lock connection failed")?;
    let acquired = riskdash_core::storage::lock::try_acquire_crawl_lock(&mut lock_conn).await?;
    if !acquired {
        tracing::warn!(%source_type, "crawl lock not acquired; another run in progress");
        return Ok(());
    }

    let record = compute_dashboard(&sources, &settings.sources, source_type).await;
    let store = PgRecordStore::new(pool.clone());
    let result = persist_record(&store, &record).await;

    let _ = riskdash_core::storage::lock::release_crawl_lock(&mut lock_conn).await;

    match result {
        Ok(stored) => {
            tracing::info!(
                record_id = %stored.id,
                %source_type,
                total_score = record.total_score,
                advice = ?record.advice,
                "persisted dashboard record"
            );
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "persisting dashboard record failed");
            Err(err)
        }
    }
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
