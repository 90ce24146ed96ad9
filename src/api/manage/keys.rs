//! API key management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OwnerScope;
use crate::api::middleware::RequireApiKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyPermissions, RateLimitPolicy};
use crate::domain::DomainError;
use crate::infrastructure::api_key::IssueApiKey;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
}

/// Key as shown to its owner; the digest is never included
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub key_prefix: String,
    pub permissions: Vec<String>,
    pub rate_limit: RateLimitPolicy,
    pub status: &'static str,
    pub usage_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyResponse {
    fn from_key(key: &ApiKey, now: DateTime<Utc>) -> Self {
        let status = if key.is_revoked() {
            "revoked"
        } else if key.is_expired_at(now) {
            "expired"
        } else {
            "active"
        };

        Self {
            id: key.id().to_string(),
            name: key.name().to_string(),
            key_prefix: key.key_prefix().to_string(),
            permissions: key.permissions().iter().map(str::to_string).collect(),
            rate_limit: key.rate_limit(),
            status,
            usage_count: key.usage_count(),
            last_used_at: key.last_used_at(),
            expires_at: key.expires_at(),
            revoked_at: key.revoked_at(),
            created_at: key.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListApiKeysResponse {
    pub keys: Vec<ApiKeyResponse>,
    pub total: usize,
}

/// Returned once, at creation; the secret cannot be retrieved again
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    pub key: ApiKeyResponse,
    pub secret: String,
}

/// GET /api/keys
pub async fn list_keys(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Query(scope): Query<OwnerScope>,
) -> Result<Json<ListApiKeysResponse>, ApiError> {
    auth.require(ApiKeyPermissions::KEYS_MANAGE)?;
    let owner_id = scope.resolve(&auth)?;

    let now = state.clock.now();
    let keys: Vec<ApiKeyResponse> = state
        .api_keys
        .list(&owner_id)
        .await?
        .iter()
        .map(|k| ApiKeyResponse::from_key(k, now))
        .collect();
    let total = keys.len();

    Ok(Json(ListApiKeysResponse { keys, total }))
}

/// POST /api/keys
pub async fn create_key(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Query(scope): Query<OwnerScope>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), ApiError> {
    auth.require(ApiKeyPermissions::KEYS_MANAGE)?;
    let owner_id = scope.resolve(&auth)?;

    let permissions = match request.permissions {
        Some(requested) => {
            // A key can only hand out what it holds itself
            if let Some(denied) = requested.iter().find(|p| !auth.0.allows(p)) {
                return Err(ApiError::forbidden(format!(
                    "Cannot grant permission '{}' not held by the calling key",
                    denied
                )));
            }
            Some(ApiKeyPermissions::from_iter(requested))
        }
        None => None,
    };

    debug!(owner_id = %owner_id, name = %request.name, "Creating API key");

    let issued = state
        .api_keys
        .issue(
            &owner_id,
            IssueApiKey {
                name: request.name,
                permissions,
                expires_at: request.expires_at,
                rate_limit: request.rate_limit,
                exceed_plan_rate: auth.0.role.is_admin(),
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            key: ApiKeyResponse::from_key(&issued.api_key, state.clock.now()),
            secret: issued.secret,
        }),
    ))
}

/// POST /api/keys/{key_id}/revoke
pub async fn revoke_key(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Path(key_id): Path<String>,
    Query(scope): Query<OwnerScope>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    auth.require(ApiKeyPermissions::KEYS_MANAGE)?;
    let owner_id = scope.resolve(&auth)?;
    let key_id = ApiKeyId::new(key_id).map_err(DomainError::from)?;

    let revoked = state.api_keys.revoke(&owner_id, &key_id).await?;

    Ok(Json(ApiKeyResponse::from_key(&revoked, state.clock.now())))
}
