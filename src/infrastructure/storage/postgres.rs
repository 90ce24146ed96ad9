//! PostgreSQL connection pooling and schema bootstrap

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::domain::DomainError;

/// PostgreSQL storage configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/lynxa".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Open a connection pool
pub async fn connect(config: &PostgresConfig) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
}

const SCHEMA: &[(&str, &str)] = &[
    (
        "owners",
        r#"
        CREATE TABLE IF NOT EXISTS owners (
            id VARCHAR(64) PRIMARY KEY,
            email TEXT NOT NULL,
            role VARCHAR(16) NOT NULL DEFAULT 'member',
            plan VARCHAR(16) NOT NULL DEFAULT 'free',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "api_keys",
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id VARCHAR(50) PRIMARY KEY,
            owner_id VARCHAR(64) NOT NULL REFERENCES owners(id),
            name TEXT NOT NULL,
            secret_hash CHAR(64) NOT NULL UNIQUE,
            key_prefix VARCHAR(32) NOT NULL,
            permissions JSONB NOT NULL DEFAULT '[]',
            rate_limit BIGINT NOT NULL,
            rate_window_ms BIGINT NOT NULL,
            expires_at TIMESTAMPTZ,
            usage_count BIGINT NOT NULL DEFAULT 0,
            last_used_at TIMESTAMPTZ,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            revoked_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "api_keys_owner_idx",
        "CREATE INDEX IF NOT EXISTS api_keys_owner_idx ON api_keys (owner_id)",
    ),
    (
        "usage_logs",
        r#"
        CREATE TABLE IF NOT EXISTS usage_logs (
            id VARCHAR(64) PRIMARY KEY,
            owner_id VARCHAR(64) NOT NULL,
            api_key_id VARCHAR(50) NOT NULL,
            endpoint TEXT NOT NULL,
            method VARCHAR(16) NOT NULL,
            status_code INTEGER NOT NULL,
            latency_ms BIGINT NOT NULL,
            tokens INTEGER NOT NULL DEFAULT 0,
            client_ip TEXT,
            user_agent TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "usage_logs_owner_time_idx",
        "CREATE INDEX IF NOT EXISTS usage_logs_owner_time_idx ON usage_logs (owner_id, created_at)",
    ),
];

/// Create every table and index the gateway needs; safe to run repeatedly
pub async fn ensure_schema(pool: &PgPool) -> Result<(), DomainError> {
    for (name, statement) in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to create {}: {}", name, e)))?;
    }

    info!(objects = SCHEMA.len(), "PostgreSQL schema ensured");
    Ok(())
}
