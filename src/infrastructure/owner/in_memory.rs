//! In-memory owner repository

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::owner::{BillingPlan, Owner, OwnerId, OwnerRepository};
use crate::domain::DomainError;

#[derive(Debug, Default)]
pub struct InMemoryOwnerRepository {
    owners: Arc<RwLock<HashMap<String, Owner>>>,
}

impl InMemoryOwnerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnerRepository for InMemoryOwnerRepository {
    async fn get(&self, id: &OwnerId) -> Result<Option<Owner>, DomainError> {
        Ok(self.owners.read().await.get(id.as_str()).cloned())
    }

    async fn create(&self, owner: Owner) -> Result<Owner, DomainError> {
        let mut owners = self.owners.write().await;
        let id = owner.id().as_str().to_string();

        if owners.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Owner '{}' already exists",
                id
            )));
        }

        owners.insert(id, owner.clone());
        Ok(owner)
    }

    async fn set_plan(&self, id: &OwnerId, plan: BillingPlan) -> Result<Owner, DomainError> {
        let mut owners = self.owners.write().await;
        let owner = owners
            .get_mut(id.as_str())
            .ok_or_else(|| DomainError::not_found(format!("Owner '{}' not found", id)))?;

        owner.set_plan(plan);
        Ok(owner.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_and_set_plan() {
        let repo = InMemoryOwnerRepository::new();
        let id = OwnerId::new("owner-1").unwrap();

        repo.create(Owner::new(id.clone(), "a@example.com"))
            .await
            .unwrap();
        assert_eq!(repo.get(&id).await.unwrap().unwrap().plan(), BillingPlan::Free);

        let updated = repo.set_plan(&id, BillingPlan::Enterprise).await.unwrap();
        assert_eq!(updated.plan(), BillingPlan::Enterprise);
        assert_eq!(
            repo.get(&id).await.unwrap().unwrap().plan(),
            BillingPlan::Enterprise
        );
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let repo = InMemoryOwnerRepository::new();
        let id = OwnerId::new("owner-1").unwrap();

        repo.create(Owner::new(id.clone(), "a@example.com"))
            .await
            .unwrap();
        let duplicate = repo.create(Owner::new(id, "b@example.com")).await;
        assert!(matches!(duplicate, Err(DomainError::Conflict { .. })));

        let missing = repo
            .set_plan(&OwnerId::new("ghost").unwrap(), BillingPlan::Pro)
            .await;
        assert!(matches!(missing, Err(DomainError::NotFound { .. })));
    }
}
