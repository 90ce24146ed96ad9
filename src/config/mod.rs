//! Application configuration

mod app_config;

pub use app_config::{
    ApiKeysConfig, AppConfig, LogFormat, LoggingConfig, MetricsConfig, RateLimitBackend,
    RateLimitConfig, ServerConfig, StorageBackend, StorageConfig,
};
