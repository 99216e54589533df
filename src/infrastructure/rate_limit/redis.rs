//! Redis-backed admission counter

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::domain::rate_limit::CounterStore;
use crate::domain::DomainError;

/// Increment-and-conditional-expire as one server-side operation. The expiry
/// is set only on the increment that creates the counter, so two concurrent
/// first hits cannot each reset the window.
const INCR_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return {count, redis.call('TTL', KEYS[1])}
"#;

/// Configuration for the Redis counter store
#[derive(Debug, Clone)]
pub struct RedisCounterStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
}

impl RedisCounterStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Counter store over a shared Redis instance
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Arc<Script>,
    config: RedisCounterStoreConfig,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCounterStore {
    /// Creates a new Redis counter store connection
    pub async fn new(config: RedisCounterStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::store(format!("failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::store(format!("failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            script: Arc::new(Script::new(INCR_WINDOW_SCRIPT)),
            config,
        })
    }

    /// Creates a counter store with default configuration
    pub async fn with_url(url: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(RedisCounterStoreConfig::new(url)).await
    }

    fn prefix_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<(u64, Duration), DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let window_secs = window.as_secs().max(1);

        let (count, ttl_secs): (u64, i64) = self
            .script
            .key(&prefixed_key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::store(format!("counter increment failed for '{}': {}", key, e))
            })?;

        // TTL is -1/-2 only if the key vanished between the two calls inside
        // the script's atomic execution window, which cannot happen; clamp
        // anyway.
        let ttl = if ttl_secs > 0 {
            Duration::from_secs(ttl_secs as u64)
        } else {
            window
        };

        Ok((count, ttl))
    }
}
