//! Self-service key and usage management under `/api`

pub mod keys;
pub mod usage;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use super::middleware::RequireApiKey;
use super::state::AppState;
use super::types::ApiError;
use crate::domain::owner::OwnerId;

pub fn create_manage_router() -> Router<AppState> {
    Router::new()
        .route("/keys", get(keys::list_keys).post(keys::create_key))
        .route("/keys/{key_id}/revoke", post(keys::revoke_key))
        .route("/usage", get(usage::usage_summary))
        .route("/usage/logs", get(usage::usage_logs))
}

/// `?owner_id=` accepted on every management route
#[derive(Debug, Default, Deserialize)]
pub struct OwnerScope {
    pub owner_id: Option<String>,
}

impl OwnerScope {
    /// Owner the call acts on: the caller's own, or any owner for admins
    pub fn resolve(&self, auth: &RequireApiKey) -> Result<OwnerId, ApiError> {
        let own = &auth.0.owner_id;

        match self.owner_id.as_deref() {
            None => Ok(own.clone()),
            Some(requested) if requested == own.as_str() => Ok(own.clone()),
            Some(requested) => {
                auth.require_admin()?;
                Ok(OwnerId::new(requested)?)
            }
        }
    }
}
