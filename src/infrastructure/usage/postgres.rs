//! PostgreSQL usage repository

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::api_key::ApiKeyId;
use crate::domain::owner::OwnerId;
use crate::domain::usage::{
    ClientMetadata, DailyUsage, UsageRecord, UsageRepository, UsageStats, UsageWindow,
};
use crate::domain::DomainError;

/// Append-only usage log in the `usage_logs` table
#[derive(Debug, Clone)]
pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<UsageRecord, DomainError> {
        let status_code: i32 = row.try_get("status_code")?;
        let latency_ms: i64 = row.try_get("latency_ms")?;
        let tokens: i32 = row.try_get("tokens")?;
        let timestamp: DateTime<Utc> = row.try_get("created_at")?;

        Ok(UsageRecord::new(
            OwnerId::new(row.try_get::<String, _>("owner_id")?)?,
            ApiKeyId::new(row.try_get::<String, _>("api_key_id")?)?,
            row.try_get::<String, _>("endpoint")?,
            row.try_get::<String, _>("method")?,
            timestamp,
        )
        .with_id(row.try_get::<String, _>("id")?)
        .with_status(u16::try_from(status_code).unwrap_or(0))
        .with_latency_ms(u64::try_from(latency_ms).unwrap_or(0))
        .with_tokens(u32::try_from(tokens).unwrap_or(0))
        .with_client(ClientMetadata {
            ip: row.try_get("client_ip")?,
            user_agent: row.try_get("user_agent")?,
        }))
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn append(&self, record: UsageRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO usage_logs (id, owner_id, api_key_id, endpoint, method, status_code,
                                    latency_ms, tokens, client_ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id().as_str())
        .bind(record.owner_id.as_str())
        .bind(record.api_key_id.as_str())
        .bind(&record.endpoint)
        .bind(&record.method)
        .bind(i32::from(record.status_code))
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(i32::try_from(record.tokens).unwrap_or(i32::MAX))
        .bind(record.client.ip.as_deref())
        .bind(record.client.user_agent.as_deref())
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn aggregate(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<UsageStats, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS total_requests,
                   COUNT(*) FILTER (WHERE status_code BETWEEN 200 AND 299)::BIGINT AS success_count,
                   COUNT(*) FILTER (WHERE status_code >= 400)::BIGINT AS error_count,
                   COALESCE(AVG(latency_ms), 0)::DOUBLE PRECISION AS avg_latency_ms,
                   COALESCE(SUM(tokens), 0)::BIGINT AS total_tokens
            FROM usage_logs
            WHERE owner_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(owner_id.as_str())
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(UsageStats {
            total_requests: non_negative(row.try_get("total_requests")?),
            success_count: non_negative(row.try_get("success_count")?),
            error_count: non_negative(row.try_get("error_count")?),
            avg_latency_ms: row.try_get("avg_latency_ms")?,
            total_tokens: non_negative(row.try_get("total_tokens")?),
            total_cost_micros: 0,
        })
    }

    async fn daily(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<Vec<DailyUsage>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                   COUNT(*)::BIGINT AS requests,
                   COALESCE(SUM(tokens), 0)::BIGINT AS tokens,
                   COUNT(*) FILTER (WHERE status_code >= 400)::BIGINT AS errors
            FROM usage_logs
            WHERE owner_id = $1 AND created_at >= $2 AND created_at < $3
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(owner_id.as_str())
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyUsage {
                    date: row.try_get::<NaiveDate, _>("day")?,
                    requests: non_negative(row.try_get("requests")?),
                    tokens: non_negative(row.try_get("tokens")?),
                    errors: non_negative(row.try_get("errors")?),
                })
            })
            .collect()
    }

    async fn recent(
        &self,
        owner_id: &OwnerId,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, api_key_id, endpoint, method, status_code, latency_ms, tokens,
                   client_ip, user_agent, created_at
            FROM usage_logs
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(owner_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
