//! Admission control contracts: the counter store abstraction and the
//! policy applied when it is unreachable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Outcome of an admission check for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Behavior when the counter store cannot be reached.
///
/// The default is `FailClosed`: an unreachable store denies admission so an
/// outage can never lift the rate limit. `FailOpen` must be chosen
/// explicitly, and the limiter logs a degraded-mode event either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    FailClosed,
    FailOpen,
}

/// Limiter settings: capacity per observation window plus store behavior
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub limit: u64,
    /// Observation window length
    pub window: Duration,
    /// Deadline for one counter-store round trip
    pub store_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(30),
            store_timeout: Duration::from_secs(3),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            ..Default::default()
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// Shared admission counter.
///
/// `incr_window` must execute increment-and-conditional-expire as a single
/// atomic operation on the store: the expiry is set only when the increment
/// creates the counter, so concurrent first hits cannot extend the window.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments the counter for `key`, creating it with a time-to-live of
    /// `window` on first increment. Returns the post-increment count and the
    /// counter's remaining time-to-live.
    async fn incr_window(&self, key: &str, window: Duration)
        -> Result<(u64, Duration), DomainError>;
}
