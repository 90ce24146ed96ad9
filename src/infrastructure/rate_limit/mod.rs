//! Rate limit store implementations and the limiter service

mod in_memory;
mod limiter;
mod redis;

pub use in_memory::InMemoryRateLimitStore;
pub use limiter::RateLimiter;
pub use self::redis::RedisRateLimitStore;
