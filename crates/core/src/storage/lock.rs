use anyhow::Context;
use sqlx::PgConnection;

// Advisory locks are scoped to the Postgres session, so acquire and release must run on the
// same connection. Used as a best-effort guard against two crawls writing at the same time.
const CRAWL_LOCK_KEY: i64 = 0x5249_534B_4441_5348; // "RISKDASH"

pub async fn try_acquire_crawl_lock(conn: &mut PgConnection) -> anyhow::Result<bool> {
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(CRAWL_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={CRAWL_LOCK_KEY})"))?;
    Ok(acquired.0)
}

pub async fn release_crawl_lock(conn: &mut PgConnection) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(CRAWL_LOCK_KEY)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={CRAWL_LOCK_KEY})"))?;
    Ok(())
}
