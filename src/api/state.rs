//! Application state shared by all handlers

use std::sync::Arc;

use crate::api::gate::RequestGate;
use crate::config::ApiKeysConfig;
use crate::domain::api_key::ApiKeyRepository;
use crate::domain::owner::OwnerRepository;
use crate::domain::rate_limit::RateLimitStore;
use crate::domain::usage::UsageRepository;
use crate::domain::Clock;
use crate::infrastructure::api_key::{
    ApiKeyGenerator, ApiKeyService, InMemoryApiKeyRepository, KeyVerifier,
};
use crate::infrastructure::completion::CompletionBackend;
use crate::infrastructure::owner::InMemoryOwnerRepository;
use crate::infrastructure::rate_limit::{InMemoryRateLimitStore, RateLimiter};
use crate::infrastructure::usage::{InMemoryUsageRepository, UsageAccountant};

/// Backing stores the services are built on
#[derive(Clone)]
pub struct Stores {
    pub keys: Arc<dyn ApiKeyRepository>,
    pub owners: Arc<dyn OwnerRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub rate_limits: Arc<dyn RateLimitStore>,
}

impl Stores {
    /// Process-local stores; state is lost on restart
    pub fn in_memory() -> Self {
        Self {
            keys: Arc::new(InMemoryApiKeyRepository::new()),
            owners: Arc::new(InMemoryOwnerRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
            rate_limits: Arc::new(InMemoryRateLimitStore::new()),
        }
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub gate: RequestGate,
    pub verifier: KeyVerifier,
    pub limiter: RateLimiter,
    pub api_keys: ApiKeyService,
    pub usage: UsageAccountant,
    pub owners: Arc<dyn OwnerRepository>,
    pub completions: Arc<dyn CompletionBackend>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire every service over the given stores
    pub fn new(
        stores: Stores,
        completions: Arc<dyn CompletionBackend>,
        clock: Arc<dyn Clock>,
        key_config: &ApiKeysConfig,
    ) -> Self {
        let verifier = KeyVerifier::new(stores.keys.clone(), stores.owners.clone(), clock.clone());
        let limiter = RateLimiter::new(stores.rate_limits, clock.clone());
        let usage = UsageAccountant::new(stores.usage, stores.owners.clone());

        let api_keys = ApiKeyService::new(
            stores.keys,
            stores.owners.clone(),
            limiter.clone(),
            clock.clone(),
        )
        .with_generator(ApiKeyGenerator::new(key_config.prefix.clone()))
        .with_max_active_per_owner(key_config.max_active_per_owner);

        let gate = RequestGate::new(verifier.clone(), limiter.clone(), usage.clone(), clock.clone());

        Self {
            gate,
            verifier,
            limiter,
            api_keys,
            usage,
            owners: stores.owners,
            completions,
            clock,
        }
    }
}
