//! Owner repository trait

use async_trait::async_trait;

use super::entity::{BillingPlan, Owner, OwnerId};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Repository for owner accounts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    /// Get an owner by ID
    async fn get(&self, id: &OwnerId) -> Result<Option<Owner>, DomainError>;

    /// Create an owner, failing if the ID is taken
    async fn create(&self, owner: Owner) -> Result<Owner, DomainError>;

    /// Change the billing plan of an owner
    async fn set_plan(&self, id: &OwnerId, plan: BillingPlan) -> Result<Owner, DomainError>;
}
