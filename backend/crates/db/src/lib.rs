pub mod advbox;
pub mod sync;

use intranet_common::error::{IntranetError, IntranetResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> IntranetResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| IntranetError::Database(e.to_string()))
}

/// Apply the SQL migrations under `backend/migrations`.
pub async fn run_migrations(pool: &PgPool) -> IntranetResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| IntranetError::Database(format!("migration failed: {e}")))?;
    tracing::info!("database migrations applied");
    Ok(())
}
