//! Usage accountant
//!
//! Writes one usage row per handled request and answers analytics reads.
//! Writes fail open: a failed row is logged and counted, never surfaced to
//! the caller whose request it describes.

use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::owner::{OwnerId, OwnerRepository};
use crate::domain::usage::{DailyUsage, UsageRecord, UsageRepository, UsageStats, UsageWindow};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_usage_failure;

/// Result of recording one usage row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Logged,
    Failed(String),
}

impl RecordOutcome {
    pub fn is_logged(&self) -> bool {
        matches!(self, Self::Logged)
    }
}

#[derive(Clone)]
pub struct UsageAccountant {
    usage: Arc<dyn UsageRepository>,
    owners: Arc<dyn OwnerRepository>,
}

impl std::fmt::Debug for UsageAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAccountant")
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl UsageAccountant {
    pub fn new(usage: Arc<dyn UsageRepository>, owners: Arc<dyn OwnerRepository>) -> Self {
        Self { usage, owners }
    }

    /// Append a usage row; never fails
    pub async fn record(&self, record: UsageRecord) -> RecordOutcome {
        let record_id = record.id().clone();
        let status = record.status_code;

        match self.usage.append(record).await {
            Ok(()) => {
                debug!(record_id = %record_id, status, "Usage recorded");
                RecordOutcome::Logged
            }
            Err(e) => {
                error!(record_id = %record_id, status, error = %e, "Failed to record usage");
                record_usage_failure();
                RecordOutcome::Failed(e.to_string())
            }
        }
    }

    /// Totals for an owner over a window, priced under the owner's plan
    pub async fn aggregate(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<UsageStats, DomainError> {
        let owner = self
            .owners
            .get(owner_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Owner '{}' not found", owner_id)))?;

        let stats = self.usage.aggregate(owner_id, window).await?;
        Ok(stats.priced(owner.plan()))
    }

    pub async fn daily(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<Vec<DailyUsage>, DomainError> {
        self.usage.daily(owner_id, window).await
    }

    pub async fn recent(
        &self,
        owner_id: &OwnerId,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        self.usage.recent(owner_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::ApiKeyId;
    use crate::domain::owner::{BillingPlan, MockOwnerRepository, Owner};
    use crate::domain::usage::MockUsageRepository;
    use crate::infrastructure::owner::InMemoryOwnerRepository;
    use crate::infrastructure::usage::InMemoryUsageRepository;
    use chrono::{Duration, Utc};

    fn record(tokens: u32, status: u16) -> UsageRecord {
        UsageRecord::new(
            OwnerId::new("owner-1").unwrap(),
            ApiKeyId::new("key-1").unwrap(),
            "/v1/chat/completions",
            "POST",
            Utc::now(),
        )
        .with_status(status)
        .with_tokens(tokens)
        .with_latency_ms(40)
    }

    #[tokio::test]
    async fn test_record_and_aggregate_with_plan_pricing() {
        let owners = Arc::new(InMemoryOwnerRepository::new());
        owners
            .create(
                Owner::new(OwnerId::new("owner-1").unwrap(), "a@example.com")
                    .with_plan(BillingPlan::Free),
            )
            .await
            .unwrap();
        let accountant = UsageAccountant::new(Arc::new(InMemoryUsageRepository::new()), owners);

        assert_eq!(accountant.record(record(1500, 200)).await, RecordOutcome::Logged);
        assert_eq!(accountant.record(record(500, 200)).await, RecordOutcome::Logged);
        assert_eq!(accountant.record(record(0, 429)).await, RecordOutcome::Logged);

        let owner = OwnerId::new("owner-1").unwrap();
        let stats = accountant
            .aggregate(&owner, UsageWindow::last_days(Utc::now() + Duration::seconds(1), 30))
            .await
            .unwrap();

        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.total_tokens, 2000);
        assert_eq!(stats.total_cost_micros, 4000);
    }

    #[tokio::test]
    async fn test_record_failure_is_reported_not_raised() {
        let usage = Arc::new(MockUsageRepository::new());
        usage.set_should_fail(true).await;
        let accountant = UsageAccountant::new(usage, Arc::new(MockOwnerRepository::new()));

        let outcome = accountant.record(record(10, 200)).await;

        assert!(!outcome.is_logged());
        assert!(matches!(outcome, RecordOutcome::Failed(reason) if reason.contains("configured to fail")));
    }

    #[tokio::test]
    async fn test_aggregate_unknown_owner() {
        let mut owners = MockOwnerRepository::new();
        owners.expect_get().returning(|_| Ok(None));
        let accountant =
            UsageAccountant::new(Arc::new(InMemoryUsageRepository::new()), Arc::new(owners));

        let result = accountant
            .aggregate(
                &OwnerId::new("ghost").unwrap(),
                UsageWindow::last_days(Utc::now(), 1),
            )
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
