//! In-memory usage repository implementation

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::owner::OwnerId;
use crate::domain::usage::{DailyUsage, UsageRecord, UsageRepository, UsageStats, UsageWindow};
use crate::domain::DomainError;

/// In-memory usage repository
#[derive(Debug, Default)]
pub struct InMemoryUsageRepository {
    records: Arc<RwLock<Vec<UsageRecord>>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record, oldest first
    pub async fn all(&self) -> Vec<UsageRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn append(&self, record: UsageRecord) -> Result<(), DomainError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn aggregate(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<UsageStats, DomainError> {
        let records = self.records.read().await;
        let mut stats = UsageStats::new();

        for record in records
            .iter()
            .filter(|r| &r.owner_id == owner_id && window.contains(r.timestamp))
        {
            stats.add_record(record);
        }

        Ok(stats)
    }

    async fn daily(
        &self,
        owner_id: &OwnerId,
        window: UsageWindow,
    ) -> Result<Vec<DailyUsage>, DomainError> {
        let records = self.records.read().await;
        let mut days = BTreeMap::new();

        for record in records
            .iter()
            .filter(|r| &r.owner_id == owner_id && window.contains(r.timestamp))
        {
            let date = record.timestamp.date_naive();
            days.entry(date)
                .or_insert_with(|| DailyUsage::empty(date))
                .add_record(record);
        }

        Ok(days.into_values().collect())
    }

    async fn recent(
        &self,
        owner_id: &OwnerId,
        limit: usize,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        let records = self.records.read().await;

        let mut result: Vec<UsageRecord> = records
            .iter()
            .filter(|r| &r.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        result.truncate(limit);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::ApiKeyId;
    use chrono::{DateTime, Duration, Utc};

    fn record(owner: &str, at: DateTime<Utc>, status: u16, tokens: u32) -> UsageRecord {
        UsageRecord::new(
            OwnerId::new(owner).unwrap(),
            ApiKeyId::new("key-1").unwrap(),
            "/v1/chat/completions",
            "POST",
            at,
        )
        .with_status(status)
        .with_tokens(tokens)
        .with_latency_ms(10)
    }

    fn day(d: u32, hour: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn test_aggregate_filters_by_owner_and_window() {
        let repo = InMemoryUsageRepository::new();
        repo.append(record("owner-1", day(1, 10), 200, 100)).await.unwrap();
        repo.append(record("owner-1", day(2, 10), 429, 0)).await.unwrap();
        repo.append(record("owner-1", day(9, 10), 200, 999)).await.unwrap();
        repo.append(record("owner-2", day(1, 10), 200, 500)).await.unwrap();

        let owner = OwnerId::new("owner-1").unwrap();
        let stats = repo
            .aggregate(&owner, UsageWindow::new(day(1, 0), day(3, 0)))
            .await
            .unwrap();

        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.total_tokens, 100);
    }

    #[tokio::test]
    async fn test_daily_buckets_by_utc_day() {
        let repo = InMemoryUsageRepository::new();
        repo.append(record("owner-1", day(2, 23), 200, 5)).await.unwrap();
        repo.append(record("owner-1", day(1, 1), 200, 10)).await.unwrap();
        repo.append(record("owner-1", day(1, 2), 500, 0)).await.unwrap();

        let owner = OwnerId::new("owner-1").unwrap();
        let daily = repo
            .daily(&owner, UsageWindow::new(day(1, 0), day(3, 0)))
            .await
            .unwrap();

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, day(1, 0).date_naive());
        assert_eq!(daily[0].requests, 2);
        assert_eq!(daily[0].errors, 1);
        assert_eq!(daily[1].tokens, 5);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let repo = InMemoryUsageRepository::new();
        let base = Utc::now();
        for i in 0..5 {
            repo.append(record("owner-1", base + Duration::seconds(i), 200, i as u32))
                .await
                .unwrap();
        }

        let owner = OwnerId::new("owner-1").unwrap();
        let recent = repo.recent(&owner, 2).await.unwrap();

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].tokens, 4);
        assert_eq!(recent[1].tokens, 3);
    }
}
