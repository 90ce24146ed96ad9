//! Domain layer - Core business logic and entities

pub mod api_key;
pub mod clock;
pub mod error;
pub mod owner;
pub mod rate_limit;
pub mod usage;

pub use api_key::{
    ApiKey, ApiKeyId, ApiKeyPermissions, ApiKeyRepository, ApiKeyValidationError, KeyRejection,
    RateLimitPolicy, VerifiedIdentity,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use owner::{BillingPlan, Owner, OwnerId, OwnerRepository, OwnerRole};
pub use rate_limit::{Admission, RateLimitError, RateLimitStore};
pub use usage::{
    ClientMetadata, DailyUsage, UsageRecord, UsageRecordId, UsageRepository, UsageStats,
    UsageWindow,
};

impl From<ApiKeyValidationError> for DomainError {
    fn from(err: ApiKeyValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}
