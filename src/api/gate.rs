//! Request gate
//!
//! Every gated call goes verify -> rate check -> permission -> execute ->
//! record. Once a key is verified, each outcome (throttled, forbidden,
//! handler error, panic, success) writes exactly one usage row. Refused
//! credentials consume no rate-limit slot and write nothing.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::api::types::ApiError;
use crate::domain::api_key::VerifiedIdentity;
use crate::domain::rate_limit::Admission;
use crate::domain::usage::{ClientMetadata, UsageRecord};
use crate::domain::Clock;
use crate::infrastructure::api_key::{KeyVerifier, VerifyError};
use crate::infrastructure::observability::record_gate_outcome;
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::usage::UsageAccountant;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// One call arriving at the gate
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    /// Presented key, `None` when the caller sent no usable bearer token
    pub credential: Option<String>,
    pub endpoint: String,
    pub method: String,
    pub required_permission: Option<&'static str>,
    pub client: ClientMetadata,
}

impl GateRequest {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn requiring(mut self, permission: &'static str) -> Self {
        self.required_permission = Some(permission);
        self
    }

    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
        self
    }
}

/// Successful handler result
#[derive(Debug, Clone)]
pub struct Handled {
    pub status: StatusCode,
    pub body: Value,
    /// Tokens consumed, recorded on the usage row
    pub tokens: u32,
}

impl Handled {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            tokens: 0,
        }
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = tokens;
        self
    }
}

/// Response produced by the gate
#[derive(Debug, Clone)]
pub struct GateResponse {
    pub status: StatusCode,
    pub body: Value,
    pub headers: HeaderMap,
}

impl GateResponse {
    fn from_error(err: ApiError) -> Self {
        Self {
            status: err.status,
            body: err.to_json(),
            headers: HeaderMap::new(),
        }
    }

    fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

impl IntoResponse for GateResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(self.body)).into_response()
    }
}

/// Composes the verifier, limiter and accountant around a handler
#[derive(Debug, Clone)]
pub struct RequestGate {
    verifier: KeyVerifier,
    limiter: RateLimiter,
    accountant: UsageAccountant,
    clock: Arc<dyn Clock>,
}

impl RequestGate {
    pub fn new(
        verifier: KeyVerifier,
        limiter: RateLimiter,
        accountant: UsageAccountant,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            limiter,
            accountant,
            clock,
        }
    }

    /// Run `handler` behind authentication, rate limiting and usage logging
    pub async fn run<F, Fut>(&self, request: GateRequest, handler: F) -> GateResponse
    where
        F: FnOnce(VerifiedIdentity) -> Fut + Send,
        Fut: Future<Output = Result<Handled, ApiError>> + Send,
    {
        let started = Instant::now();

        let Some(credential) = request.credential.as_deref().filter(|c| !c.is_empty()) else {
            record_gate_outcome("unauthenticated");
            return GateResponse::from_error(ApiError::invalid_credential());
        };

        let identity = match self.verifier.verify(credential).await {
            Ok(identity) => identity,
            Err(VerifyError::Rejected(reason)) => {
                debug!(endpoint = %request.endpoint, reason = %reason, "Credential refused");
                record_gate_outcome("unauthenticated");
                return GateResponse::from_error(ApiError::invalid_credential());
            }
            Err(VerifyError::StorageUnavailable(reason)) => {
                warn!(endpoint = %request.endpoint, reason = %reason, "Key store unavailable");
                record_gate_outcome("unavailable");
                return GateResponse::from_error(ApiError::unavailable(
                    "credential store temporarily unavailable",
                ));
            }
        };

        let admission = match self
            .limiter
            .admit(&identity.bucket_key(), identity.policy)
            .await
        {
            Ok(admission) => admission,
            Err(e) => {
                error!(key_id = %identity.key_id, error = %e, "Rate limit check failed");
                let response = GateResponse::from_error(ApiError::unavailable(
                    "rate limiter temporarily unavailable",
                ));
                return self
                    .finish(&identity, &request, response, 0, started, "unavailable")
                    .await;
            }
        };

        let mut headers = rate_limit_headers(&admission);

        if !admission.allowed {
            headers.insert(
                header::RETRY_AFTER,
                HeaderValue::from(admission.retry_after_secs(self.clock.now())),
            );
            let response = GateResponse::from_error(ApiError::rate_limited(format!(
                "Rate limit of {} requests per {} ms exceeded",
                identity.policy.limit, identity.policy.window_ms
            )));
            let response = throttled_body(response, &admission).with_headers(headers);
            return self
                .finish(&identity, &request, response, 0, started, "throttled")
                .await;
        }

        if let Some(permission) = request.required_permission {
            if !identity.allows(permission) {
                let response = GateResponse::from_error(ApiError::forbidden(format!(
                    "API key lacks the '{}' permission",
                    permission
                )))
                .with_headers(headers);
                return self
                    .finish(&identity, &request, response, 0, started, "forbidden")
                    .await;
            }
        }

        let caller = identity.clone();
        let outcome = AssertUnwindSafe(async move { handler(caller).await })
            .catch_unwind()
            .await;

        let (response, tokens, label) = match outcome {
            Ok(Ok(handled)) => (
                GateResponse {
                    status: handled.status,
                    body: handled.body,
                    headers: HeaderMap::new(),
                },
                handled.tokens,
                "executed",
            ),
            Ok(Err(err)) => (GateResponse::from_error(err), 0, "handler_error"),
            Err(_) => {
                error!(key_id = %identity.key_id, endpoint = %request.endpoint, "Handler panicked");
                (
                    GateResponse::from_error(ApiError::internal("internal server error")),
                    0,
                    "panicked",
                )
            }
        };

        self.finish(
            &identity,
            &request,
            response.with_headers(headers),
            tokens,
            started,
            label,
        )
        .await
    }

    async fn finish(
        &self,
        identity: &VerifiedIdentity,
        request: &GateRequest,
        response: GateResponse,
        tokens: u32,
        started: Instant,
        outcome: &'static str,
    ) -> GateResponse {
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let record = UsageRecord::new(
            identity.owner_id.clone(),
            identity.key_id.clone(),
            request.endpoint.clone(),
            request.method.clone(),
            self.clock.now(),
        )
        .with_status(response.status.as_u16())
        .with_latency_ms(latency_ms)
        .with_tokens(tokens)
        .with_client(request.client.clone());

        self.accountant.record(record).await;
        record_gate_outcome(outcome);

        debug!(
            key_id = %identity.key_id,
            endpoint = %request.endpoint,
            status = response.status.as_u16(),
            outcome,
            latency_ms,
            "Gated request finished"
        );

        response
    }
}

/// Caller address and agent from proxy headers
pub fn client_metadata(headers: &HeaderMap) -> ClientMetadata {
    let ip = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    ClientMetadata {
        ip,
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rate_limit_headers(admission: &Admission) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(admission.reset_at_ms()));
    headers
}

fn throttled_body(mut response: GateResponse, admission: &Admission) -> GateResponse {
    if let Some(body) = response.body.as_object_mut() {
        body.insert("remaining".to_string(), Value::from(admission.remaining));
        body.insert("resetAt".to_string(), Value::from(admission.reset_at_ms()));
    }
    response
}
