//! Usage repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::record::{DailyUsage, UsageRecord, UsageStats, UsageWindow};
use crate::domain::owner::OwnerId;
use crate::domain::DomainError;

/// Append-only store of usage records
#[async_trait]
pub trait UsageRepository: Send + Sync + Debug {
    /// Append one record
    async fn append(&self, record: UsageRecord) -> Result<(), DomainError>;

    /// Unpriced totals for an owner over a window
    async fn aggregate(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<UsageStats, DomainError>;

    /// Per-UTC-day totals for an owner over a window, oldest day first
    async fn daily(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<Vec<DailyUsage>, DomainError>;

    /// Most recent records of an owner, newest first
    async fn recent(&self, owner_id: &OwnerId, limit: usize)
    -> Result<Vec<UsageRecord>, DomainError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Mock usage repository recording appended rows
    #[derive(Debug, Default)]
    pub struct MockUsageRepository {
        records: Arc<RwLock<Vec<UsageRecord>>>,
        should_fail: Arc<RwLock<bool>>,
    }

    impl MockUsageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Set whether operations should fail
        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.write().await = fail;
        }

        /// Snapshot of appended records
        pub async fn records(&self) -> Vec<UsageRecord> {
            self.records.read().await.clone()
        }

        async fn check_should_fail(&self) -> Result<(), DomainError> {
            if *self.should_fail.read().await {
                return Err(DomainError::storage("Mock repository configured to fail"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UsageRepository for MockUsageRepository {
        async fn append(&self, record: UsageRecord) -> Result<(), DomainError> {
            self.check_should_fail().await?;
            self.records.write().await.push(record);
            Ok(())
        }

        async fn aggregate(
            &self,
            owner_id: &OwnerId,
            window: UsageWindow,
        ) -> Result<UsageStats, DomainError> {
            self.check_should_fail().await?;
            let mut stats = UsageStats::new();
            for record in self.records.read().await.iter() {
                if &record.owner_id == owner_id && window.contains(record.timestamp) {
                    stats.add_record(record);
                }
            }
            Ok(stats)
        }

        async fn daily(
            &self,
            _owner_id: &OwnerId,
            _window: UsageWindow,
        ) -> Result<Vec<DailyUsage>, DomainError> {
            self.check_should_fail().await?;
            Ok(Vec::new())
        }

        async fn recent(
            &self,
            owner_id: &OwnerId,
            limit: usize,
        ) -> Result<Vec<UsageRecord>, DomainError> {
            self.check_should_fail().await?;
            let records = self.records.read().await;
            Ok(records
                .iter()
                .rev()
                .filter(|r| &r.owner_id == owner_id)
                .take(limit)
                .cloned()
                .collect())
        }
    }
}
