//! API key authentication

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::VerifiedIdentity;
use crate::infrastructure::api_key::VerifyError;

/// Extractor that requires a valid API key
///
/// Only `Authorization: Bearer <api_key>` is accepted.
#[derive(Debug, Clone)]
pub struct RequireApiKey(pub VerifiedIdentity);

impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = bearer_credential(&parts.headers).ok_or_else(ApiError::invalid_credential)?;

        match state.verifier.verify(&presented).await {
            Ok(identity) => Ok(RequireApiKey(identity)),
            Err(VerifyError::Rejected(reason)) => {
                debug!(reason = %reason, path = %parts.uri.path(), "Credential refused");
                Err(ApiError::invalid_credential())
            }
            Err(VerifyError::StorageUnavailable(_)) => Err(ApiError::unavailable(
                "credential store temporarily unavailable",
            )),
        }
    }
}

impl RequireApiKey {
    /// Fail with 403 unless the key holds `permission`
    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        if self.0.allows(permission) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "API key lacks the '{}' permission",
                permission
            )))
        }
    }

    /// Fail with 403 unless the owner is an admin
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.role.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin role required"))
        }
    }
}

/// Token from an `Authorization: Bearer` header, if one is present
pub fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, value.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        let h = headers(&[("authorization", "Bearer lnx_live_abc123")]);
        assert_eq!(bearer_credential(&h).as_deref(), Some("lnx_live_abc123"));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let h = headers(&[("authorization", "bearer lnx_live_abc123")]);
        assert_eq!(bearer_credential(&h).as_deref(), Some("lnx_live_abc123"));
    }

    #[test]
    fn test_x_api_key_is_not_accepted() {
        let h = headers(&[("x-api-key", "lnx_live_abc123")]);
        assert_eq!(bearer_credential(&h), None);
    }

    #[test]
    fn test_other_schemes_rejected() {
        let h = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(bearer_credential(&h), None);
    }

    #[test]
    fn test_empty_and_missing_tokens() {
        assert_eq!(bearer_credential(&HeaderMap::new()), None);
        assert_eq!(bearer_credential(&headers(&[("authorization", "Bearer    ")])), None);
        assert_eq!(bearer_credential(&headers(&[("authorization", "Bearer")])), None);
    }

    #[test]
    fn test_trimmed_token() {
        let h = headers(&[("authorization", "Bearer   lnx_live_spaced   ")]);
        assert_eq!(bearer_credential(&h).as_deref(), Some("lnx_live_spaced"));
    }
}
