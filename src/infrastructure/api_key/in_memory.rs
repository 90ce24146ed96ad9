//! In-memory API key repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository};
use crate::domain::owner::OwnerId;
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct KeyTable {
    keys: HashMap<String, ApiKey>,
    /// secret_hash -> key id
    hash_index: HashMap<String, String>,
}

/// In-memory implementation of ApiKeyRepository
///
/// Every mutation runs under the table's write lock, which makes usage
/// increments and cap checks atomic.
#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    table: Arc<RwLock<KeyTable>>,
}

impl InMemoryApiKeyRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored active flag without touching `revoked_at`
    ///
    /// Mirrors an operator editing the row by hand.
    pub async fn force_active_flag(&self, id: &ApiKeyId, active: bool) -> Result<(), DomainError> {
        let mut table = self.table.write().await;
        let key = table
            .keys
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;
        key.force_active_flag(active);
        Ok(())
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn find_by_hash(&self, secret_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let table = self.table.read().await;
        Ok(table
            .hash_index
            .get(secret_hash)
            .and_then(|id| table.keys.get(id))
            .cloned())
    }

    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let table = self.table.read().await;
        Ok(table.keys.get(id.as_str()).cloned())
    }

    async fn increment_usage(&self, id: &ApiKeyId, now: DateTime<Utc>) -> Result<(), DomainError> {
        let mut table = self.table.write().await;

        if let Some(key) = table.keys.get_mut(id.as_str()) {
            key.record_usage(now);
            Ok(())
        } else {
            Err(DomainError::not_found(format!(
                "API key '{}' not found",
                id
            )))
        }
    }

    async fn create_capped(
        &self,
        api_key: ApiKey,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, DomainError> {
        let mut table = self.table.write().await;

        let id = api_key.id().as_str().to_string();
        let hash = api_key.secret_hash().to_string();

        if table.keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                id
            )));
        }

        if table.hash_index.contains_key(&hash) {
            return Err(DomainError::conflict("API key secret already registered"));
        }

        let live = table
            .keys
            .values()
            .filter(|k| k.owner_id() == api_key.owner_id() && k.counts_toward_cap(now))
            .count();

        if live >= max_active {
            return Err(DomainError::quota_exceeded(format!(
                "Owner already has {} of {} allowed active API keys",
                live, max_active
            )));
        }

        table.hash_index.insert(hash, id.clone());
        table.keys.insert(id, api_key.clone());

        Ok(api_key)
    }

    async fn revoke(
        &self,
        owner_id: &OwnerId,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, DomainError> {
        let mut table = self.table.write().await;

        match table.keys.get_mut(id.as_str()) {
            Some(key) if key.owner_id() == owner_id => {
                key.revoke(now);
                Ok(key.clone())
            }
            _ => Err(DomainError::not_found(format!(
                "API key '{}' not found",
                id
            ))),
        }
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        let table = self.table.read().await;

        let mut result: Vec<ApiKey> = table
            .keys
            .values()
            .filter(|k| k.owner_id() == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        Ok(result)
    }
}
