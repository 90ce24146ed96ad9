//! Owner administration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::middleware::RequireApiKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::owner::{BillingPlan, Owner, OwnerId, OwnerRole};

#[derive(Debug, Deserialize)]
pub struct CreateOwnerRequest {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: OwnerRole,
    #[serde(default)]
    pub plan: BillingPlan,
}

#[derive(Debug, Deserialize)]
pub struct SetPlanRequest {
    pub plan: BillingPlan,
}

#[derive(Debug, Serialize)]
pub struct OwnerResponse {
    pub id: String,
    pub email: String,
    pub role: OwnerRole,
    pub plan: BillingPlan,
    pub created_at: DateTime<Utc>,
}

impl From<Owner> for OwnerResponse {
    fn from(owner: Owner) -> Self {
        Self {
            id: owner.id().to_string(),
            email: owner.email().to_string(),
            role: owner.role(),
            plan: owner.plan(),
            created_at: owner.created_at(),
        }
    }
}

/// POST /admin/owners
pub async fn create_owner(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Json(request): Json<CreateOwnerRequest>,
) -> Result<(StatusCode, Json<OwnerResponse>), ApiError> {
    auth.require_admin()?;

    if request.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty").with_param("email"));
    }

    let owner = Owner::new(OwnerId::new(request.id)?, request.email)
        .with_role(request.role)
        .with_plan(request.plan)
        .with_created_at(state.clock.now());
    let created = state.owners.create(owner).await?;

    info!(owner_id = %created.id(), plan = %created.plan(), by = %auth.0.owner_id, "Owner created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /admin/owners/{owner_id}
pub async fn get_owner(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Path(owner_id): Path<String>,
) -> Result<Json<OwnerResponse>, ApiError> {
    auth.require_admin()?;
    let owner_id = OwnerId::new(owner_id)?;

    let owner = state
        .owners
        .get(&owner_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Owner '{}' not found", owner_id)))?;

    Ok(Json(owner.into()))
}

/// PUT /admin/owners/{owner_id}/plan
///
/// Existing keys keep their rate limit; the plan applies to keys issued
/// afterwards and to pricing of usage reports.
pub async fn set_plan(
    State(state): State<AppState>,
    auth: RequireApiKey,
    Path(owner_id): Path<String>,
    Json(request): Json<SetPlanRequest>,
) -> Result<Json<OwnerResponse>, ApiError> {
    auth.require_admin()?;
    let owner_id = OwnerId::new(owner_id)?;

    let owner = state.owners.set_plan(&owner_id, request.plan).await?;

    info!(owner_id = %owner_id, plan = %request.plan, by = %auth.0.owner_id, "Owner plan changed");
    Ok(Json(owner.into()))
}
