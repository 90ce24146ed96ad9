//! Infrastructure layer - stores, verification, rate limiting and accounting

pub mod api_key;
pub mod completion;
pub mod logging;
pub mod observability;
pub mod owner;
pub mod rate_limit;
pub mod storage;
pub mod usage;
