//! Migrate command - creates the PostgreSQL schema

use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::storage::{self, PostgresConfig};

/// Create every table and index the gateway needs, then exit
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_logging(&config.logging);

    let pg_config = PostgresConfig::new(&config.storage.database_url)
        .with_max_connections(config.storage.max_connections);
    let pool = storage::connect(&pg_config).await?;

    storage::ensure_schema(&pool).await?;
    pool.close().await;

    info!("Schema is up to date");
    Ok(())
}
