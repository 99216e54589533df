//! In-memory admission counter for tests and single-process deployments

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::rate_limit::CounterStore;
use crate::domain::DomainError;

#[derive(Debug, Clone)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

/// Process-local counter store. Counters shared only within one process, so
/// this backend is not suitable for multi-instance deployments.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<(u64, Duration), DomainError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DomainError::internal("counter store lock poisoned"))?;

        let now = Instant::now();

        // Drop entries whose window has elapsed so the map does not grow
        // unbounded across window boundaries
        entries.retain(|_, entry| entry.expires_at > now);

        let entry = entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now + window,
        });

        entry.count += 1;
        let ttl = entry.expires_at.saturating_duration_since(now);

        Ok((entry.count, ttl))
    }
}
