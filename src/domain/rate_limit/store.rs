//! Rate limit store trait and admission decision

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised by a rate limit store
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Outcome of one admission attempt against a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    #[serde(serialize_with = "serialize_millis")]
    pub reset_at: DateTime<Utc>,
}

impl Admission {
    pub fn allowed(limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
        }
    }

    pub fn denied(limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
        }
    }

    /// Window end as unix epoch milliseconds
    pub fn reset_at_ms(&self) -> i64 {
        self.reset_at.timestamp_millis()
    }

    /// Whole seconds until the window ends, rounded up, at least 1
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

fn serialize_millis<S: serde::Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(at.timestamp_millis())
}

/// Fixed-window counters keyed by an arbitrary bucket string
///
/// Algorithm for `admit`, per bucket:
/// - no entry, or `now > reset_at`: start a new window with count 1
/// - `count >= limit`: deny, leave the entry untouched
/// - otherwise: increment and allow
///
/// A caller can burst up to twice the limit across a window boundary.
#[async_trait]
pub trait RateLimitStore: Send + Sync + Debug {
    /// Attempt to take one slot from `bucket` at `now`
    async fn admit(
        &self,
        bucket: &str,
        limit: u32,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<Admission, RateLimitError>;

    /// Drop entries whose window ended before `now`; returns how many went
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError>;

    /// Forget a bucket entirely
    async fn reset(&self, bucket: &str) -> Result<(), RateLimitError>;
}
