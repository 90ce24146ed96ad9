//! Redis-backed fixed-window rate limit store
//!
//! Shares counters across gateway instances. Each bucket is a hash with
//! `count` and `reset_at` fields, updated by one Lua script so the
//! read-decide-write cycle is atomic on the server.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::domain::rate_limit::{Admission, RateLimitError, RateLimitStore};

/// KEYS[1] bucket; ARGV limit, window_ms, now_ms.
/// Returns {allowed, remaining, reset_at_ms}.
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local reset_at = tonumber(redis.call('HGET', key, 'reset_at') or '-1')

if reset_at < 0 or now > reset_at then
    reset_at = now + window_ms
    redis.call('HSET', key, 'count', 1, 'reset_at', reset_at)
    -- Keep the hash through the inclusive end of the window
    redis.call('PEXPIREAT', key, reset_at + 1)
    return {1, limit - 1, reset_at}
end

local count = tonumber(redis.call('HGET', key, 'count') or '0')
if count >= limit then
    return {0, 0, reset_at}
end

count = redis.call('HINCRBY', key, 'count', 1)
return {1, limit - count, reset_at}
"#;

/// Redis rate limit store
#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection: ConnectionManager,
    key_prefix: String,
    script: Script,
}

impl fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRateLimitStore")
            .field("key_prefix", &self.key_prefix)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisRateLimitStore {
    /// Connect to Redis
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
    ) -> Result<Self, RateLimitError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            script: Script::new(ADMIT_SCRIPT),
        })
    }

    fn prefix_key(&self, bucket: &str) -> String {
        format!("{}{}", self.key_prefix, bucket)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn admit(
        &self,
        bucket: &str,
        limit: u32,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<Admission, RateLimitError> {
        let now_ms = now.timestamp_millis();
        let window_ms = i64::try_from(window_ms).unwrap_or(i64::MAX / 2);

        if limit == 0 {
            return Ok(Admission::denied(
                0,
                DateTime::from_timestamp_millis(now_ms.saturating_add(window_ms))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ));
        }

        let mut conn = self.connection.clone();
        let result: Vec<i64> = self
            .script
            .key(self.prefix_key(bucket))
            .arg(limit)
            .arg(window_ms)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;

        let (allowed, remaining, reset_at_ms) = match result.as_slice() {
            [allowed, remaining, reset_at] => (*allowed == 1, *remaining, *reset_at),
            other => {
                return Err(RateLimitError::Unavailable(format!(
                    "unexpected rate limit script reply: {:?}",
                    other
                )));
            }
        };
        let reset_at = DateTime::from_timestamp_millis(reset_at_ms).unwrap_or(now);
        let remaining = u32::try_from(remaining.max(0)).unwrap_or(0);

        Ok(if allowed {
            Admission::allowed(limit, remaining, reset_at)
        } else {
            Admission::denied(limit, reset_at)
        })
    }

    /// Keys expire on their own through `PEXPIREAT`
    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        Ok(0)
    }

    async fn reset(&self, bucket: &str) -> Result<(), RateLimitError> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(self.prefix_key(bucket)).await?;
        Ok(())
    }
}
