//! API Key domain
//!
//! Domain types and traits for API key issuance and verification: the key
//! entity, its permissions and rate-limit policy, and the outcome of
//! verifying a presented credential.

mod entity;
mod identity;
mod repository;
mod validation;

pub use entity::{ApiKey, ApiKeyId, ApiKeyPermissions, RateLimitPolicy};
pub use identity::{KeyRejection, VerifiedIdentity};
pub use repository::ApiKeyRepository;
pub use validation::{
    validate_api_key_id, validate_api_key_name, validate_key_prefix, ApiKeyValidationError,
};

#[cfg(test)]
pub use repository::mock::MockApiKeyRepository;
