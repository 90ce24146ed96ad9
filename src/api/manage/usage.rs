//! Usage analytics endpoints

use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerScope;
use crate::api::middleware::RequireApiKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::api_key::ApiKeyPermissions;
use crate::domain::usage::{ClientMetadata, DailyUsage, UsageRecord, UsageStats, UsageWindow};

const DEFAULT_WINDOW_DAYS: i64 = 30;
const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageSummaryResponse {
    pub owner_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub stats: UsageStats,
    pub total_cost_usd: f64,
    pub daily: Vec<DailyUsage>,
}

#[derive(Debug, Serialize)]
pub struct UsageLogResponse {
    pub id: String,
    pub api_key_id: String,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub tokens: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub client: ClientMetadata,
}

impl From<UsageRecord> for UsageLogResponse {
    fn from(record: UsageRecord) -> Self {
        Self {
            id: record.id().to_string(),
            api_key_id: record.api_key_id.to_string(),
            endpoint: record.endpoint,
            method: record.method,
            status_code: record.status_code,
            latency_ms: record.latency_ms,
            tokens: record.tokens,
            timestamp: record.timestamp,
            client: record.client,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsageLogsResponse {
    pub logs: Vec<UsageLogResponse>,
    pub total: usize,
}

/// GET /api/usage
pub async fn usage_summary(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummaryResponse>, ApiError> {
    auth.require(ApiKeyPermissions::USAGE_READ)?;
    let owner_id = OwnerScope {
        owner_id: query.owner_id,
    }
    .resolve(&auth)?;

    let now = state.clock.now();
    let to = query.to.unwrap_or(now);
    let from = query
        .from
        .unwrap_or_else(|| UsageWindow::last_days(to, DEFAULT_WINDOW_DAYS).from);
    if from >= to {
        return Err(ApiError::bad_request("'from' must be earlier than 'to'").with_param("from"));
    }
    let window = UsageWindow::new(from, to);

    let stats = state.usage.aggregate(&owner_id, window).await?;
    let daily = state.usage.daily(&owner_id, window).await?;

    Ok(Json(UsageSummaryResponse {
        owner_id: owner_id.to_string(),
        from,
        to,
        total_cost_usd: stats.total_cost_usd(),
        stats,
        daily,
    }))
}

/// GET /api/usage/logs
pub async fn usage_logs(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Query(query): Query<LogsQuery>,
) -> Result<Json<UsageLogsResponse>, ApiError> {
    auth.require(ApiKeyPermissions::USAGE_READ)?;
    let owner_id = OwnerScope {
        owner_id: query.owner_id,
    }
    .resolve(&auth)?;

    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);

    let logs: Vec<UsageLogResponse> = state
        .usage
        .recent(&owner_id, limit)
        .await?
        .into_iter()
        .map(UsageLogResponse::from)
        .collect();
    let total = logs.len();

    Ok(Json(UsageLogsResponse { logs, total }))
}
