//! Rate limiter service
//!
//! Applies a [`RateLimitStore`] with the injected clock and owns the
//! background sweep of expired windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::api_key::RateLimitPolicy;
use crate::domain::rate_limit::{Admission, RateLimitError, RateLimitStore};
use crate::domain::Clock;
use crate::infrastructure::observability::record_rate_limit_sweep;

/// Fixed-window rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Take one slot from `bucket` under `policy`, now
    pub async fn admit(
        &self,
        bucket: &str,
        policy: RateLimitPolicy,
    ) -> Result<Admission, RateLimitError> {
        let admission = self
            .store
            .admit(bucket, policy.limit, policy.window_ms, self.clock.now())
            .await?;

        if !admission.allowed {
            debug!(bucket, reset_at = admission.reset_at_ms(), "Rate limit exceeded");
        }

        Ok(admission)
    }

    /// Forget a bucket
    pub async fn reset(&self, bucket: &str) -> Result<(), RateLimitError> {
        self.store.reset(bucket).await
    }

    /// Drop every window that has ended
    pub async fn sweep(&self) -> Result<usize, RateLimitError> {
        let removed = self.store.cleanup_expired(self.clock.now()).await?;
        record_rate_limit_sweep(removed);
        Ok(removed)
    }

    /// Run [`sweep`](Self::sweep) every `every` until the task is aborted
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match limiter.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Swept expired rate limit windows"),
                    Err(e) => warn!(error = %e, "Rate limit sweep failed"),
                }
            }
        })
    }
}
