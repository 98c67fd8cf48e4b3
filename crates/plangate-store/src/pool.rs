//! Connection pool, schema migrations and `db-init` reporting.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::target::DbTarget;

/// Migrations embedded at compile time from `crates/plangate-store/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Pool size for the serving store.
const MAX_CONNECTIONS: u32 = 5;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

async fn open(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await
}

/// Open the pool the document store runs on.
pub async fn connect(target: &DbTarget) -> Result<PgPool> {
    open(target.url(), MAX_CONNECTIONS)
        .await
        .with_context(|| format!("failed to connect to database at {target}"))
}

/// Apply all pending embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!("migrations applied");
    Ok(())
}

/// Create the target database unless it already exists.
///
/// Returns `true` when the database was created by this call.
pub async fn ensure_database(target: &DbTarget) -> Result<bool> {
    let maintenance = open(&target.maintenance_url(), 1)
        .await
        .with_context(|| format!("failed to reach the postgres database next to {target}"))?;

    let result = create_if_missing(&maintenance, target).await;
    maintenance.close().await;
    result
}

async fn create_if_missing(maintenance: &PgPool, target: &DbTarget) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(target.database())
            .fetch_one(maintenance)
            .await
            .context("failed to query pg_database")?;
    if exists {
        info!(db = target.database(), "database already exists");
        return Ok(false);
    }

    maintenance
        .execute(target.create_statement().as_str())
        .await
        .with_context(|| format!("failed to create database {}", target.database()))?;
    info!(db = target.database(), "database created");
    Ok(true)
}

/// Document totals for one kind of collection, e.g. every `plans` collection.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CollectionStats {
    /// Last segment of the collection path (`plans`, `details`).
    pub kind: String,
    /// Distinct collection paths of this kind; for `plans`, one per user.
    pub collections: i64,
    pub documents: i64,
}

/// Per-kind document counts, printed by `plangate db-init`.
pub async fn collection_stats(pool: &PgPool) -> Result<Vec<CollectionStats>> {
    sqlx::query_as::<_, CollectionStats>(
        "SELECT regexp_replace(collection, '^.*/', '') AS kind, \
                COUNT(DISTINCT collection) AS collections, \
                COUNT(*) AS documents \
         FROM documents \
         GROUP BY kind \
         ORDER BY kind",
    )
    .fetch_all(pool)
    .await
    .context("failed to count documents")
}
