//! In-memory fixed-window rate limit store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::domain::rate_limit::{Admission, RateLimitError, RateLimitStore};

/// Counter state of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

impl WindowEntry {
    fn open(now: DateTime<Utc>, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at: window_end(now, window_ms),
        }
    }

    /// Apply one admission attempt to this entry
    fn admit(&mut self, limit: u32, window_ms: u64, now: DateTime<Utc>) -> Admission {
        if now > self.reset_at {
            *self = Self::open(now, window_ms);
            return Admission::allowed(limit, limit - 1, self.reset_at);
        }

        if self.count >= limit {
            return Admission::denied(limit, self.reset_at);
        }

        self.count += 1;
        Admission::allowed(limit, limit - self.count, self.reset_at)
    }
}

/// End of a window opened at `now`, saturating at the latest representable instant
fn window_end(now: DateTime<Utc>, window_ms: u64) -> DateTime<Utc> {
    i64::try_from(window_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Process-local rate limit store
///
/// The outer map lock is held for reading while a bucket is mutated through
/// its own mutex, so distinct buckets never wait on each other; the write
/// lock is only taken to insert a new bucket or to sweep.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: RwLock<HashMap<String, Arc<Mutex<WindowEntry>>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked buckets
    pub async fn len(&self) -> usize {
        self.buckets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buckets.read().await.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn admit(
        &self,
        bucket: &str,
        limit: u32,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<Admission, RateLimitError> {
        if limit == 0 {
            return Ok(Admission::denied(0, window_end(now, window_ms)));
        }

        {
            let buckets = self.buckets.read().await;
            if let Some(entry) = buckets.get(bucket) {
                let mut entry = entry.lock().await;
                return Ok(entry.admit(limit, window_ms, now));
            }
        }

        let mut buckets = self.buckets.write().await;
        match buckets.get(bucket) {
            // Another request created the bucket between the two locks
            Some(entry) => {
                let mut entry = entry.lock().await;
                Ok(entry.admit(limit, window_ms, now))
            }
            None => {
                let entry = WindowEntry::open(now, window_ms);
                buckets.insert(bucket.to_string(), Arc::new(Mutex::new(entry)));
                Ok(Admission::allowed(limit, limit - 1, entry.reset_at))
            }
        }
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();

        // A bucket whose mutex is held is in use and survives this sweep
        buckets.retain(|_, entry| match entry.try_lock() {
            Ok(entry) => entry.reset_at >= now,
            Err(_) => true,
        });

        Ok(before - buckets.len())
    }

    async fn reset(&self, bucket: &str) -> Result<(), RateLimitError> {
        self.buckets.write().await.remove(bucket);
        Ok(())
    }
}
