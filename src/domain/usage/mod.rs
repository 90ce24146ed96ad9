//! Usage accounting domain
//!
//! One record per handled, authenticated request, plus the aggregates read
//! back by the analytics endpoints.

mod record;
mod repository;

pub use record::{ClientMetadata, DailyUsage, UsageRecord, UsageRecordId, UsageStats, UsageWindow};
pub use repository::UsageRepository;

#[cfg(test)]
pub use repository::mock::MockUsageRepository;
