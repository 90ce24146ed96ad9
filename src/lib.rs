//! Lynxa Gateway
//!
//! API gateway in front of a text-completion backend:
//! - API key issuance, verification and revocation
//! - Fixed-window rate limiting per key (in-memory or Redis)
//! - Per-request usage accounting with plan-based pricing

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::{AppState, Stores};
use config::{RateLimitBackend, StorageBackend};
use domain::{ApiKeyPermissions, BillingPlan, DomainError, Owner, OwnerId, OwnerRole, SystemClock};
use infrastructure::{
    api_key::{IssueApiKey, PostgresApiKeyRepository},
    completion::CannedCompletionBackend,
    owner::PostgresOwnerRepository,
    rate_limit::{InMemoryRateLimitStore, RedisRateLimitStore},
    storage::{self, PostgresConfig},
    usage::PostgresUsageRepository,
};
use tracing::{info, warn};

/// Owner that the bootstrap admin key belongs to
pub const ADMIN_OWNER_ID: &str = "admin";

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let mut stores = Stores::in_memory();

    info!("Storage backend: {:?}", config.storage.backend);
    if config.storage.backend == StorageBackend::Postgres {
        let pg_config = PostgresConfig::new(&config.storage.database_url)
            .with_max_connections(config.storage.max_connections);

        info!("Connecting to PostgreSQL...");
        let pool = storage::connect(&pg_config).await?;
        storage::ensure_schema(&pool).await?;
        info!("PostgreSQL connection established");

        stores.keys = Arc::new(PostgresApiKeyRepository::new(pool.clone()));
        stores.owners = Arc::new(PostgresOwnerRepository::new(pool.clone()));
        stores.usage = Arc::new(PostgresUsageRepository::new(pool));
    }

    info!("Rate limit backend: {:?}", config.rate_limit.backend);
    stores.rate_limits = match config.rate_limit.backend {
        RateLimitBackend::Memory => Arc::new(InMemoryRateLimitStore::new()),
        RateLimitBackend::Redis => Arc::new(
            RedisRateLimitStore::connect(&config.rate_limit.redis_url, &config.rate_limit.key_prefix)
                .await?,
        ),
    };

    let state = AppState::new(
        stores,
        Arc::new(CannedCompletionBackend::default()),
        Arc::new(SystemClock),
        &config.api_keys,
    );

    if let Ok(secret) = std::env::var("ADMIN_API_KEY") {
        seed_admin(&state, &secret).await?;
    }

    Ok(state)
}

/// Ensure the admin owner exists and `secret` is a usable full-access key
async fn seed_admin(state: &AppState, secret: &str) -> anyhow::Result<()> {
    let owner_id = OwnerId::new(ADMIN_OWNER_ID)?;
    let email = std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string());

    let owner = Owner::new(owner_id.clone(), email)
        .with_role(OwnerRole::Admin)
        .with_plan(BillingPlan::Enterprise);
    match state.owners.create(owner).await {
        Ok(_) => info!(owner_id = %owner_id, "Admin owner created"),
        Err(DomainError::Conflict { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    // Survives restarts with persistent storage
    if let Some(existing) = state.api_keys.find_by_secret(secret).await? {
        if existing.check_usable(state.clock.now()).is_ok() {
            info!(key_id = %existing.id(), "Admin API key already registered");
        } else {
            warn!(key_id = %existing.id(), "Admin API key is revoked or expired");
        }
        return Ok(());
    }

    let issued = state
        .api_keys
        .issue_with_secret(
            &owner_id,
            IssueApiKey {
                permissions: Some(ApiKeyPermissions::full_access()),
                ..IssueApiKey::named("Admin Key")
            },
            secret,
        )
        .await;

    match issued {
        Ok(issued) => info!(key_id = %issued.api_key.id(), "Admin API key created"),
        Err(e) => warn!(error = %e, "Admin API key could not be registered"),
    }

    Ok(())
}
