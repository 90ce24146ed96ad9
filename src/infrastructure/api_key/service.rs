//! API Key service
//!
//! Provides high-level operations for API key management.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::api_key::{
    validate_api_key_name, ApiKey, ApiKeyId, ApiKeyPermissions, ApiKeyRepository,
    RateLimitPolicy,
};
use crate::domain::owner::{OwnerId, OwnerRepository};
use crate::domain::{Clock, DomainError};
use crate::infrastructure::rate_limit::RateLimiter;

use super::generator::{hash_key, ApiKeyGenerator, GeneratedApiKey};

/// Longest rate-limit window a key may carry (24h)
pub const MAX_RATE_LIMIT_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Result of creating a new API key
#[derive(Debug)]
pub struct IssuedApiKey {
    /// The API key entity (without the secret)
    pub api_key: ApiKey,
    /// The full secret key (only returned once)
    pub secret: String,
}

/// Parameters for issuing a key
#[derive(Debug, Clone, Default)]
pub struct IssueApiKey {
    pub name: String,
    /// Defaults to [`ApiKeyPermissions::standard`]
    pub permissions: Option<ApiKeyPermissions>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Defaults to the owner's plan policy
    pub rate_limit: Option<RateLimitPolicy>,
    /// Issued by an admin; `rate_limit` may exceed the owner's plan rate
    pub exceed_plan_rate: bool,
}

impl IssueApiKey {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// API Key service for managing API keys
#[derive(Clone)]
pub struct ApiKeyService {
    keys: Arc<dyn ApiKeyRepository>,
    owners: Arc<dyn OwnerRepository>,
    rate_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    generator: ApiKeyGenerator,
    max_active_per_owner: usize,
}

impl std::fmt::Debug for ApiKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService")
            .field("keys", &self.keys)
            .field("generator", &self.generator)
            .field("max_active_per_owner", &self.max_active_per_owner)
            .finish_non_exhaustive()
    }
}

impl ApiKeyService {
    /// Create a new API key service
    pub fn new(
        keys: Arc<dyn ApiKeyRepository>,
        owners: Arc<dyn OwnerRepository>,
        rate_limiter: RateLimiter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            owners,
            rate_limiter,
            clock,
            generator: ApiKeyGenerator::production(),
            max_active_per_owner: 10,
        }
    }

    /// Create with a custom generator
    pub fn with_generator(mut self, generator: ApiKeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Set the per-owner cap on usable keys
    pub fn with_max_active_per_owner(mut self, max: usize) -> Self {
        self.max_active_per_owner = max;
        self
    }

    /// Issue a new random key for `owner_id`
    pub async fn issue(
        &self,
        owner_id: &OwnerId,
        request: IssueApiKey,
    ) -> Result<IssuedApiKey, DomainError> {
        let generated = self.generator.generate();
        self.store(owner_id, request, generated).await
    }

    /// Register a key whose full string is already known
    ///
    /// Used to bootstrap the admin key from the environment.
    pub async fn issue_with_secret(
        &self,
        owner_id: &OwnerId,
        request: IssueApiKey,
        secret: &str,
    ) -> Result<IssuedApiKey, DomainError> {
        let generated = self.generator.from_full_key(secret);
        self.store(owner_id, request, generated).await
    }

    async fn store(
        &self,
        owner_id: &OwnerId,
        request: IssueApiKey,
        generated: GeneratedApiKey,
    ) -> Result<IssuedApiKey, DomainError> {
        validate_api_key_name(&request.name)?;

        let owner = self
            .owners
            .get(owner_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Owner '{}' not found", owner_id)))?;

        let now = self.clock.now();
        if let Some(expires_at) = request.expires_at {
            if expires_at <= now {
                return Err(DomainError::validation("expires_at must be in the future"));
            }
        }

        let plan_policy = owner.plan().default_rate_limit();
        let policy = request.rate_limit.unwrap_or(plan_policy);
        if policy.window_ms == 0 || policy.window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(DomainError::validation(format!(
                "rate limit window must be between 1 and {} ms",
                MAX_RATE_LIMIT_WINDOW_MS
            )));
        }
        if !request.exceed_plan_rate && policy.exceeds_rate_of(&plan_policy) {
            return Err(DomainError::forbidden(format!(
                "rate limit exceeds the {} plan allowance of {} requests per {} ms",
                owner.plan(),
                plan_policy.limit,
                plan_policy.window_ms
            )));
        }

        let mut api_key = ApiKey::new(
            ApiKeyId::generate(),
            owner_id.clone(),
            request.name,
            generated.hash,
            generated.prefix,
            policy,
        )
        .with_permissions(request.permissions.unwrap_or_else(ApiKeyPermissions::standard))
        .with_created_at(now);

        if let Some(expires_at) = request.expires_at {
            api_key = api_key.with_expiration(expires_at);
        }

        let created = self
            .keys
            .create_capped(api_key, self.max_active_per_owner, now)
            .await?;

        info!(
            key_id = %created.id(),
            owner_id = %owner_id,
            prefix = created.key_prefix(),
            "API key issued"
        );

        Ok(IssuedApiKey {
            api_key: created,
            secret: generated.key,
        })
    }

    /// All keys of an owner, newest first
    pub async fn list(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        self.keys.list_by_owner(owner_id).await
    }

    /// Get a key that belongs to `owner_id`
    pub async fn get(&self, owner_id: &OwnerId, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        match self.keys.get(id).await? {
            Some(key) if key.owner_id() == owner_id => Ok(key),
            _ => Err(DomainError::not_found(format!("API key '{}' not found", id))),
        }
    }

    /// Revoke a key that belongs to `owner_id`
    ///
    /// Idempotent. The key's rate-limit bucket is dropped as well.
    /// Key registered under `secret`, looked up without counting a use
    pub async fn find_by_secret(&self, secret: &str) -> Result<Option<ApiKey>, DomainError> {
        self.keys.find_by_hash(&hash_key(secret)).await
    }

    pub async fn revoke(&self, owner_id: &OwnerId, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        let revoked = self.keys.revoke(owner_id, id, self.clock.now()).await?;

        if let Err(e) = self.rate_limiter.reset(&format!("key:{}", id)).await {
            warn!(key_id = %id, error = %e, "Failed to reset rate limit bucket after revocation");
        }

        info!(key_id = %id, owner_id = %owner_id, "API key revoked");
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::owner::{BillingPlan, Owner};
    use crate::domain::{KeyRejection, ManualClock};
    use crate::infrastructure::api_key::{
        hash_key, InMemoryApiKeyRepository, KeyVerifier, VerifyError,
    };
    use crate::infrastructure::owner::InMemoryOwnerRepository;
    use crate::infrastructure::rate_limit::InMemoryRateLimitStore;
    use chrono::Duration;

    struct Fixture {
        service: ApiKeyService,
        verifier: KeyVerifier,
        limiter: RateLimiter,
        clock: Arc<ManualClock>,
    }

    async fn fixture(plan: BillingPlan) -> Fixture {
        let keys = Arc::new(InMemoryApiKeyRepository::new());
        let owners = Arc::new(InMemoryOwnerRepository::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), clock.clone());

        owners
            .create(Owner::new(owner(), "a@example.com").with_plan(plan))
            .await
            .unwrap();

        let service = ApiKeyService::new(keys.clone(), owners.clone(), limiter.clone(), clock.clone())
            .with_generator(ApiKeyGenerator::test())
            .with_max_active_per_owner(3);
        let verifier = KeyVerifier::new(keys, owners, clock.clone());

        Fixture {
            service,
            verifier,
            limiter,
            clock,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("owner-1").unwrap()
    }

    #[tokio::test]
    async fn test_issue_uses_plan_defaults() {
        let f = fixture(BillingPlan::Pro).await;

        let issued = f
            .service
            .issue(&owner(), IssueApiKey::named("Backend"))
            .await
            .unwrap();

        assert!(issued.secret.starts_with("lnx_test_"));
        assert_eq!(issued.api_key.name(), "Backend");
        assert_eq!(issued.api_key.rate_limit(), RateLimitPolicy::new(600, 60_000));
        assert_eq!(issued.api_key.secret_hash(), hash_key(&issued.secret));
        assert!(issued.api_key.permissions().allows("chat"));

        let identity = f.verifier.verify(&issued.secret).await.unwrap();
        assert_eq!(identity.key_id, *issued.api_key.id());
    }

    #[tokio::test]
    async fn test_issue_enforces_cap() {
        let f = fixture(BillingPlan::Free).await;

        for i in 0..3 {
            f.service
                .issue(&owner(), IssueApiKey::named(format!("key {}", i)))
                .await
                .unwrap();
        }

        let result = f.service.issue(&owner(), IssueApiKey::named("one too many")).await;
        assert!(matches!(result, Err(DomainError::QuotaExceeded { .. })));
    }

    #[tokio::test]
    async fn test_issue_validates_input() {
        let f = fixture(BillingPlan::Free).await;

        let blank = f.service.issue(&owner(), IssueApiKey::named("  ")).await;
        assert!(matches!(blank, Err(DomainError::Validation { .. })));

        let past = IssueApiKey {
            expires_at: Some(f.clock.now() - Duration::seconds(1)),
            ..IssueApiKey::named("expired")
        };
        let result = f.service.issue(&owner(), past).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));

        let unknown = f
            .service
            .issue(&OwnerId::new("ghost").unwrap(), IssueApiKey::named("x"))
            .await;
        assert!(matches!(unknown, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_issue_rejects_windows_outside_bounds() {
        let f = fixture(BillingPlan::Free).await;

        for window_ms in [0, MAX_RATE_LIMIT_WINDOW_MS + 1, 10_000_000_000_000_000] {
            let request = IssueApiKey {
                rate_limit: Some(RateLimitPolicy::new(1, window_ms)),
                ..IssueApiKey::named("odd window")
            };
            let result = f.service.issue(&owner(), request).await;
            assert!(matches!(result, Err(DomainError::Validation { .. })), "window {}", window_ms);
        }

        let day = IssueApiKey {
            rate_limit: Some(RateLimitPolicy::new(1, MAX_RATE_LIMIT_WINDOW_MS)),
            ..IssueApiKey::named("daily")
        };
        assert!(f.service.issue(&owner(), day).await.is_ok());
    }

    #[tokio::test]
    async fn test_member_cannot_exceed_plan_rate() {
        let f = fixture(BillingPlan::Free).await;

        let greedy = IssueApiKey {
            rate_limit: Some(RateLimitPolicy::new(4_000_000_000, 60_000)),
            ..IssueApiKey::named("greedy")
        };
        let result = f.service.issue(&owner(), greedy).await;
        assert!(matches!(result, Err(DomainError::Forbidden { .. })));

        // Same rate spread over a longer window is fine: 60/min == 120/2min
        let spread = IssueApiKey {
            rate_limit: Some(RateLimitPolicy::new(120, 120_000)),
            ..IssueApiKey::named("spread")
        };
        assert!(f.service.issue(&owner(), spread).await.is_ok());

        let elevated = IssueApiKey {
            rate_limit: Some(RateLimitPolicy::new(10_000, 60_000)),
            exceed_plan_rate: true,
            ..IssueApiKey::named("granted by admin")
        };
        let issued = f.service.issue(&owner(), elevated).await.unwrap();
        assert_eq!(issued.api_key.rate_limit().limit, 10_000);
    }

    #[tokio::test]
    async fn test_find_by_secret_does_not_count_usage() {
        let f = fixture(BillingPlan::Free).await;
        let issued = f
            .service
            .issue(&owner(), IssueApiKey::named("quiet"))
            .await
            .unwrap();

        let found = f.service.find_by_secret(&issued.secret).await.unwrap().unwrap();
        assert_eq!(found.id(), issued.api_key.id());
        assert_eq!(found.usage_count(), 0);
        assert!(found.last_used_at().is_none());
        assert!(f.service.find_by_secret("lnx_test_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_blocks_key_and_resets_bucket() {
        let f = fixture(BillingPlan::Free).await;
        let issued = f
            .service
            .issue(
                &owner(),
                IssueApiKey {
                    rate_limit: Some(RateLimitPolicy::new(1, 60_000)),
                    ..IssueApiKey::named("limited")
                },
            )
            .await
            .unwrap();
        let bucket = format!("key:{}", issued.api_key.id());
        let policy = issued.api_key.rate_limit();

        f.limiter.admit(&bucket, policy).await.unwrap();
        assert!(!f.limiter.admit(&bucket, policy).await.unwrap().allowed);

        let revoked = f.service.revoke(&owner(), issued.api_key.id()).await.unwrap();
        assert!(revoked.is_revoked());
        assert!(f.limiter.admit(&bucket, policy).await.unwrap().allowed);

        assert_eq!(
            f.verifier.verify(&issued.secret).await,
            Err(VerifyError::Rejected(KeyRejection::Revoked))
        );

        // Second revocation is a no-op
        assert!(f.service.revoke(&owner(), issued.api_key.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_and_revoke_are_owner_scoped() {
        let f = fixture(BillingPlan::Free).await;
        let issued = f
            .service
            .issue(&owner(), IssueApiKey::named("mine"))
            .await
            .unwrap();
        let stranger = OwnerId::new("owner-2").unwrap();

        assert!(f.service.get(&owner(), issued.api_key.id()).await.is_ok());
        assert!(matches!(
            f.service.get(&stranger, issued.api_key.id()).await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.revoke(&stranger, issued.api_key.id()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_issue_with_known_secret() {
        let f = fixture(BillingPlan::Enterprise).await;

        let issued = f
            .service
            .issue_with_secret(
                &owner(),
                IssueApiKey {
                    permissions: Some(ApiKeyPermissions::full_access()),
                    ..IssueApiKey::named("Bootstrap")
                },
                "lnx_test_bootstrap-secret",
            )
            .await
            .unwrap();

        assert_eq!(issued.secret, "lnx_test_bootstrap-secret");
        let identity = f.verifier.verify("lnx_test_bootstrap-secret").await.unwrap();
        assert!(identity.permissions.allows("keys:manage"));
        assert_eq!(f.service.list(&owner()).await.unwrap().len(), 1);
    }
}
