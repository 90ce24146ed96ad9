//! Admin API endpoints, restricted to owners with the admin role

pub mod owners;

use axum::{
    routing::{get, post, put},
    Router,
};

use super::state::AppState;

/// Create admin API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/owners", post(owners::create_owner))
        .route("/owners/{owner_id}", get(owners::get_owner))
        .route("/owners/{owner_id}/plan", put(owners::set_plan))
}
