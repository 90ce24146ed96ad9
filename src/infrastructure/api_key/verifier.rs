//! Presented-key verification
//!
//! digest -> exact lookup -> decision -> atomic usage increment. Nothing is
//! cached between calls, so a revocation is visible to the next request.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use super::generator::hash_key;
use crate::domain::api_key::{ApiKeyRepository, KeyRejection, VerifiedIdentity};
use crate::domain::owner::OwnerRepository;
use crate::domain::{Clock, DomainError};

/// Errors returned by [`KeyVerifier::verify`]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerifyError {
    #[error("credential rejected: {0}")]
    Rejected(KeyRejection),

    #[error("key store unavailable: {0}")]
    StorageUnavailable(String),
}

impl VerifyError {
    fn storage(err: DomainError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// Resolves a presented API key into a [`VerifiedIdentity`]
#[derive(Clone)]
pub struct KeyVerifier {
    keys: Arc<dyn ApiKeyRepository>,
    owners: Arc<dyn OwnerRepository>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for KeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVerifier")
            .field("keys", &self.keys)
            .field("clock", &self.clock)
            .finish()
    }
}

impl KeyVerifier {
    pub fn new(
        keys: Arc<dyn ApiKeyRepository>,
        owners: Arc<dyn OwnerRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            owners,
            clock,
        }
    }

    /// Verify a presented key
    ///
    /// First failing check wins: unknown digest, revoked, expired. On
    /// acceptance the key's usage counter goes up by exactly one. Store
    /// failures fail closed as `StorageUnavailable`.
    pub async fn verify(&self, presented: &str) -> Result<VerifiedIdentity, VerifyError> {
        let digest = hash_key(presented);
        let now = self.clock.now();

        let key = self
            .keys
            .find_by_hash(&digest)
            .await
            .map_err(|e| {
                error!(error = %e, "API key lookup failed");
                VerifyError::storage(e)
            })?
            .ok_or_else(|| reject(KeyRejection::UnknownKey, None))?;

        key.check_usable(now)
            .map_err(|reason| reject(reason, Some(key.id().as_str())))?;

        let owner = self
            .owners
            .get(key.owner_id())
            .await
            .map_err(|e| {
                error!(error = %e, key_id = %key.id(), "Owner lookup failed");
                VerifyError::storage(e)
            })?
            .ok_or_else(|| reject(KeyRejection::UnknownKey, Some(key.id().as_str())))?;

        match self.keys.increment_usage(key.id(), now).await {
            Ok(()) => {}
            Err(DomainError::NotFound { .. }) => {
                return Err(reject(KeyRejection::UnknownKey, Some(key.id().as_str())));
            }
            Err(e) => {
                error!(error = %e, key_id = %key.id(), "API key usage increment failed");
                return Err(VerifyError::storage(e));
            }
        }

        debug!(key_id = %key.id(), owner_id = %owner.id(), "API key verified");

        Ok(VerifiedIdentity {
            owner_id: owner.id().clone(),
            key_id: key.id().clone(),
            role: owner.role(),
            plan: owner.plan(),
            permissions: key.permissions().clone(),
            policy: key.rate_limit(),
        })
    }
}

fn reject(reason: KeyRejection, key_id: Option<&str>) -> VerifyError {
    debug!(reason = %reason, key_id = key_id.unwrap_or("-"), "API key rejected");
    VerifyError::Rejected(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::{ApiKey, ApiKeyId, MockApiKeyRepository, RateLimitPolicy};
    use crate::domain::owner::{MockOwnerRepository, Owner, OwnerId, OwnerRole};
    use crate::domain::ManualClock;
    use crate::infrastructure::api_key::InMemoryApiKeyRepository;
    use crate::infrastructure::owner::InMemoryOwnerRepository;
    use chrono::{Duration, Utc};

    const PRESENTED: &str = "lnx_live_0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn test_key(id: &str) -> ApiKey {
        ApiKey::new(
            ApiKeyId::new(id).unwrap(),
            OwnerId::new("owner-1").unwrap(),
            "Test Key",
            hash_key(PRESENTED),
            "lnx_live_01234567",
            RateLimitPolicy::new(2, 60_000),
        )
    }

    async fn setup(key: ApiKey) -> (KeyVerifier, Arc<InMemoryApiKeyRepository>, Arc<ManualClock>) {
        let keys = Arc::new(InMemoryApiKeyRepository::new());
        let owners = Arc::new(InMemoryOwnerRepository::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        owners
            .create(Owner::new(OwnerId::new("owner-1").unwrap(), "a@example.com").with_role(OwnerRole::Admin))
            .await
            .unwrap();
        keys.create_capped(key, 10, clock.now()).await.unwrap();

        let verifier = KeyVerifier::new(keys.clone(), owners, clock.clone());
        (verifier, keys, clock)
    }

    #[tokio::test]
    async fn test_accepts_valid_key_and_counts_usage() {
        let (verifier, keys, _) = setup(test_key("key-1")).await;

        let identity = verifier.verify(PRESENTED).await.unwrap();
        assert_eq!(identity.key_id.as_str(), "key-1");
        assert_eq!(identity.owner_id.as_str(), "owner-1");
        assert_eq!(identity.role, OwnerRole::Admin);
        assert_eq!(identity.policy, RateLimitPolicy::new(2, 60_000));

        let stored = keys.get(&identity.key_id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected_without_side_effects() {
        let (verifier, keys, _) = setup(test_key("key-1")).await;

        let first = verifier.verify("lnx_live_not-a-real-key").await;
        let second = verifier.verify("lnx_live_not-a-real-key").await;

        assert_eq!(first, Err(VerifyError::Rejected(KeyRejection::UnknownKey)));
        assert_eq!(first, second);

        let stored = keys.get(&ApiKeyId::new("key-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_key_is_rejected_after_expiry_only() {
        let expires = Utc::now() + Duration::minutes(5);
        let (verifier, _, clock) = setup(test_key("key-1").with_expiration(expires)).await;

        clock.set(expires);
        assert!(verifier.verify(PRESENTED).await.is_ok());

        clock.set(expires + Duration::milliseconds(1));
        assert_eq!(
            verifier.verify(PRESENTED).await,
            Err(VerifyError::Rejected(KeyRejection::Expired))
        );
    }

    #[tokio::test]
    async fn test_revocation_is_terminal_even_after_flag_flip() {
        let (verifier, keys, clock) = setup(test_key("key-1")).await;
        let id = ApiKeyId::new("key-1").unwrap();
        let owner = OwnerId::new("owner-1").unwrap();

        assert!(verifier.verify(PRESENTED).await.is_ok());

        keys.revoke(&owner, &id, clock.now()).await.unwrap();
        assert_eq!(
            verifier.verify(PRESENTED).await,
            Err(VerifyError::Rejected(KeyRejection::Revoked))
        );

        keys.force_active_flag(&id, true).await.unwrap();
        assert_eq!(
            verifier.verify(PRESENTED).await,
            Err(VerifyError::Rejected(KeyRejection::Revoked))
        );

        let stored = keys.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifications_count_every_acceptance() {
        let (verifier, keys, _) = setup(test_key("key-1")).await;
        let verifier = Arc::new(verifier);
        const N: usize = 100;

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let verifier = verifier.clone();
                tokio::spawn(async move { verifier.verify(PRESENTED).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let stored = keys.get(&ApiKeyId::new("key-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), N as u64);
    }

    #[tokio::test]
    async fn test_key_store_failure_fails_closed() {
        let keys = Arc::new(MockApiKeyRepository::new());
        keys.insert(test_key("key-1")).await;
        keys.set_should_fail(true).await;

        let verifier = KeyVerifier::new(
            keys,
            Arc::new(InMemoryOwnerRepository::new()),
            Arc::new(ManualClock::new(Utc::now())),
        );

        assert!(matches!(
            verifier.verify(PRESENTED).await,
            Err(VerifyError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_store_failure_fails_closed() {
        let keys = Arc::new(MockApiKeyRepository::new());
        keys.insert(test_key("key-1")).await;

        let mut owners = MockOwnerRepository::new();
        owners
            .expect_get()
            .returning(|_| Err(DomainError::storage("connection refused")));

        let verifier = KeyVerifier::new(
            keys.clone(),
            Arc::new(owners),
            Arc::new(ManualClock::new(Utc::now())),
        );

        assert!(matches!(
            verifier.verify(PRESENTED).await,
            Err(VerifyError::StorageUnavailable(_))
        ));
        let stored = keys.get(&ApiKeyId::new("key-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_owner_is_unknown_key() {
        let keys = Arc::new(MockApiKeyRepository::new());
        keys.insert(test_key("key-1")).await;

        let mut owners = MockOwnerRepository::new();
        owners.expect_get().times(1).returning(|_| Ok(None));

        let verifier = KeyVerifier::new(
            keys,
            Arc::new(owners),
            Arc::new(ManualClock::new(Utc::now())),
        );

        assert_eq!(
            verifier.verify(PRESENTED).await,
            Err(VerifyError::Rejected(KeyRejection::UnknownKey))
        );
    }
}
