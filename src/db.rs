use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Opens the pool and applies pending migrations from `migrations/`.
pub async fn connect_pg(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database ready, migrations applied");
    Ok(pool)
}
