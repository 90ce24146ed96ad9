//! API Key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{ApiKey, ApiKeyId};
use crate::domain::owner::OwnerId;
use crate::domain::DomainError;

/// Repository trait for API key storage
///
/// Mutations that must not lose updates under concurrency (`increment_usage`,
/// `create_capped`, `revoke`) are atomic at the store.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Exact lookup by the hex SHA-256 digest of the full key string
    async fn find_by_hash(&self, secret_hash: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Get an API key by its ID
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    /// Atomically add one to the usage counter and stamp `last_used_at`
    async fn increment_usage(&self, id: &ApiKeyId, now: DateTime<Utc>) -> Result<(), DomainError>;

    /// Insert a key unless its owner already holds `max_active` usable keys
    ///
    /// Fails with `QuotaExceeded` when the cap is reached and `Conflict` when
    /// the ID or digest is already taken.
    async fn create_capped(
        &self,
        api_key: ApiKey,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, DomainError>;

    /// Revoke a key belonging to `owner_id`
    ///
    /// Returns `NotFound` when the key does not exist or belongs to someone
    /// else. Revoking twice keeps the first revocation timestamp.
    async fn revoke(
        &self,
        owner_id: &OwnerId,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, DomainError>;

    /// All keys of an owner, newest first
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Mock API key repository for testing
    #[derive(Debug, Default)]
    pub struct MockApiKeyRepository {
        keys: Arc<RwLock<HashMap<String, ApiKey>>>,
        should_fail: Arc<RwLock<bool>>,
    }

    impl MockApiKeyRepository {
        /// Create a new mock repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a key without going through the cap check
        pub async fn insert(&self, api_key: ApiKey) {
            self.keys
                .write()
                .await
                .insert(api_key.id().as_str().to_string(), api_key);
        }

        /// Flip the stored active flag, bypassing revocation bookkeeping
        pub async fn force_active_flag(&self, id: &ApiKeyId, active: bool) {
            if let Some(key) = self.keys.write().await.get_mut(id.as_str()) {
                key.force_active_flag(active);
            }
        }

        /// Set whether operations should fail
        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.write().await = fail;
        }

        async fn check_should_fail(&self) -> Result<(), DomainError> {
            if *self.should_fail.read().await {
                return Err(DomainError::storage("Mock repository configured to fail"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ApiKeyRepository for MockApiKeyRepository {
        async fn find_by_hash(&self, secret_hash: &str) -> Result<Option<ApiKey>, DomainError> {
            self.check_should_fail().await?;
            let keys = self.keys.read().await;
            Ok(keys
                .values()
                .find(|k| k.secret_hash() == secret_hash)
                .cloned())
        }

        async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
            self.check_should_fail().await?;
            Ok(self.keys.read().await.get(id.as_str()).cloned())
        }

        async fn increment_usage(
            &self,
            id: &ApiKeyId,
            now: DateTime<Utc>,
        ) -> Result<(), DomainError> {
            self.check_should_fail().await?;
            let mut keys = self.keys.write().await;
            let key = keys
                .get_mut(id.as_str())
                .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;
            key.record_usage(now);
            Ok(())
        }

        async fn create_capped(
            &self,
            api_key: ApiKey,
            max_active: usize,
            now: DateTime<Utc>,
        ) -> Result<ApiKey, DomainError> {
            self.check_should_fail().await?;
            let mut keys = self.keys.write().await;

            let live = keys
                .values()
                .filter(|k| k.owner_id() == api_key.owner_id() && k.counts_toward_cap(now))
                .count();
            if live >= max_active {
                return Err(DomainError::quota_exceeded(format!(
                    "Owner already has {} active API keys",
                    live
                )));
            }

            keys.insert(api_key.id().as_str().to_string(), api_key.clone());
            Ok(api_key)
        }

        async fn revoke(
            &self,
            owner_id: &OwnerId,
            id: &ApiKeyId,
            now: DateTime<Utc>,
        ) -> Result<ApiKey, DomainError> {
            self.check_should_fail().await?;
            let mut keys = self.keys.write().await;
            match keys.get_mut(id.as_str()) {
                Some(key) if key.owner_id() == owner_id => {
                    key.revoke(now);
                    Ok(key.clone())
                }
                _ => Err(DomainError::not_found(format!("API key '{}' not found", id))),
            }
        }

        async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
            self.check_should_fail().await?;
            let keys = self.keys.read().await;
            let mut result: Vec<ApiKey> = keys
                .values()
                .filter(|k| k.owner_id() == owner_id)
                .cloned()
                .collect();
            result.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
            Ok(result)
        }
    }
}
