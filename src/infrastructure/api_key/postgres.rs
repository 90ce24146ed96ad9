//! PostgreSQL API key repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::api_key::{
    ApiKey, ApiKeyId, ApiKeyPermissions, ApiKeyRepository, RateLimitPolicy,
};
use crate::domain::owner::OwnerId;
use crate::domain::DomainError;

const KEY_COLUMNS: &str = "id, owner_id, name, secret_hash, key_prefix, permissions, rate_limit, \
     rate_window_ms, expires_at, usage_count, last_used_at, active, revoked_at, created_at";

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed implementation of ApiKeyRepository
///
/// Usage increments and revocations are single `UPDATE` statements; the
/// per-owner cap is checked under a transaction-scoped advisory lock.
#[derive(Debug, Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_key(row: &PgRow) -> Result<ApiKey, DomainError> {
        let id: String = row.try_get("id")?;
        let owner_id: String = row.try_get("owner_id")?;
        let permissions: serde_json::Value = row.try_get("permissions")?;
        let permissions: ApiKeyPermissions = serde_json::from_value(permissions)
            .map_err(|e| DomainError::storage(format!("Invalid permissions column: {}", e)))?;
        let rate_limit: i64 = row.try_get("rate_limit")?;
        let rate_window_ms: i64 = row.try_get("rate_window_ms")?;
        let usage_count: i64 = row.try_get("usage_count")?;
        let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at")?;

        let mut key = ApiKey::new(
            ApiKeyId::new(id)?,
            OwnerId::new(owner_id)?,
            row.try_get::<String, _>("name")?,
            row.try_get::<String, _>("secret_hash")?,
            row.try_get::<String, _>("key_prefix")?,
            RateLimitPolicy::new(
                u32::try_from(rate_limit).unwrap_or(u32::MAX),
                u64::try_from(rate_window_ms).unwrap_or(0),
            ),
        )
        .with_permissions(permissions)
        .with_created_at(row.try_get("created_at")?)
        .with_persisted_state(
            u64::try_from(usage_count).unwrap_or(0),
            row.try_get("last_used_at")?,
            row.try_get("active")?,
            row.try_get("revoked_at")?,
        );

        if let Some(expires_at) = expires_at {
            key = key.with_expiration(expires_at);
        }

        Ok(key)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn find_by_hash(&self, secret_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let query = format!("SELECT {} FROM api_keys WHERE secret_hash = $1", KEY_COLUMNS);

        let row = sqlx::query(&query)
            .bind(secret_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_key).transpose()
    }

    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let query = format!("SELECT {} FROM api_keys WHERE id = $1", KEY_COLUMNS);

        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_key).transpose()
    }

    async fn increment_usage(&self, id: &ApiKeyId, now: DateTime<Utc>) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE api_keys SET usage_count = usage_count + 1, last_used_at = $2 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                id
            )));
        }

        Ok(())
    }

    async fn create_capped(
        &self,
        api_key: ApiKey,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, DomainError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(api_key.owner_id().as_str())
            .execute(&mut *tx)
            .await?;

        let live: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM api_keys
            WHERE owner_id = $1
              AND active
              AND revoked_at IS NULL
              AND (expires_at IS NULL OR expires_at >= $2)
            "#,
        )
        .bind(api_key.owner_id().as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if live as usize >= max_active {
            return Err(DomainError::quota_exceeded(format!(
                "Owner already has {} of {} allowed active API keys",
                live, max_active
            )));
        }

        let permissions = serde_json::to_value(api_key.permissions())
            .map_err(|e| DomainError::internal(format!("Failed to encode permissions: {}", e)))?;
        let policy = api_key.rate_limit();

        let insert = sqlx::query(
            r#"
            INSERT INTO api_keys (id, owner_id, name, secret_hash, key_prefix, permissions,
                                  rate_limit, rate_window_ms, expires_at, usage_count,
                                  last_used_at, active, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(api_key.id().as_str())
        .bind(api_key.owner_id().as_str())
        .bind(api_key.name())
        .bind(api_key.secret_hash())
        .bind(api_key.key_prefix())
        .bind(permissions)
        .bind(i64::from(policy.limit))
        .bind(i64::try_from(policy.window_ms).unwrap_or(i64::MAX))
        .bind(api_key.expires_at())
        .bind(i64::try_from(api_key.usage_count()).unwrap_or(i64::MAX))
        .bind(api_key.last_used_at())
        .bind(api_key.is_active())
        .bind(api_key.revoked_at())
        .bind(api_key.created_at())
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert {
            return Err(if is_unique_violation(&e) {
                DomainError::conflict(format!("API key '{}' already exists", api_key.id()))
            } else {
                e.into()
            });
        }

        tx.commit().await?;
        Ok(api_key)
    }

    async fn revoke(
        &self,
        owner_id: &OwnerId,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, DomainError> {
        let query = format!(
            r#"
            UPDATE api_keys
            SET active = FALSE, revoked_at = COALESCE(revoked_at, $3)
            WHERE id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            KEY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id.as_str())
            .bind(owner_id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_key(&row),
            None => Err(DomainError::not_found(format!(
                "API key '{}' not found",
                id
            ))),
        }
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        let query = format!(
            "SELECT {} FROM api_keys WHERE owner_id = $1 ORDER BY created_at DESC",
            KEY_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(owner_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_key).collect()
    }
}
