//! Sliding-window admission control keyed by service identity

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error};

use crate::domain::auth::ServiceId;
use crate::domain::rate_limit::{Admission, CounterStore, FailurePolicy, RateLimitConfig};

/// Admission gate backed by a shared counter store.
///
/// The counter store is the single source of truth: requests from one
/// service share a counter no matter which worker handles them.
pub struct ServiceRateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for ServiceRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRateLimiter")
            .field("config", &self.config)
            .field("store", &"<CounterStore>")
            .finish()
    }
}

impl ServiceRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Increment-then-check admission for one request from `service_id`.
    ///
    /// The store round trip is bounded by the configured deadline; on store
    /// failure the configured `FailurePolicy` decides the outcome.
    pub async fn admit(&self, service_id: &ServiceId) -> Admission {
        let key = self.window_key(service_id);
        let operation = self.store.incr_window(&key, self.config.window);

        let outcome = match tokio::time::timeout(self.config.store_timeout, operation).await {
            Ok(Ok((count, ttl))) => {
                if count <= self.config.limit {
                    Admission::Allowed
                } else {
                    debug!(
                        service_id = %service_id,
                        count,
                        limit = self.config.limit,
                        "admission denied"
                    );
                    Admission::Denied { retry_after: ttl }
                }
            }
            Ok(Err(err)) => self.degraded(service_id, &err.to_string()),
            Err(_) => self.degraded(service_id, "counter store deadline exceeded"),
        };

        if !outcome.is_allowed() {
            metrics::counter!("notify_admission_denied_total").increment(1);
        }

        outcome
    }

    fn degraded(&self, service_id: &ServiceId, reason: &str) -> Admission {
        error!(
            service_id = %service_id,
            reason,
            policy = ?self.config.failure_policy,
            "rate limit store unavailable, applying failure policy"
        );
        metrics::counter!("notify_rate_limit_store_failures_total").increment(1);

        match self.config.failure_policy {
            FailurePolicy::FailOpen => Admission::Allowed,
            FailurePolicy::FailClosed => Admission::Denied {
                retry_after: self.config.window,
            },
        }
    }

    /// Counter key for the current fixed window: `rate-limit:<service>:<window-start>`
    fn window_key(&self, service_id: &ServiceId) -> String {
        let window_secs = self.config.window.as_secs().max(1);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let window_start = now - now % window_secs;

        format!("rate-limit:{}:{}", service_id, window_start)
    }
}
