//! Owner domain
//!
//! Accounts that own API keys, with their role and billing plan.

mod entity;
mod repository;

pub use entity::{BillingPlan, Owner, OwnerId, OwnerRole};
pub use repository::OwnerRepository;

#[cfg(test)]
pub use repository::MockOwnerRepository;
