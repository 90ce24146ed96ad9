//! API middleware components

pub mod auth;
pub mod logging;
pub mod metrics;

use axum::{body::Body, extract::MatchedPath, http::Request};

pub use auth::{bearer_credential, RequireApiKey};
pub use logging::logging_middleware;
pub use metrics::metrics_middleware;

/// Route pattern of a request (`/api/keys/{key_id}/revoke`), or its raw path
/// when no route matched
pub(crate) fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}
