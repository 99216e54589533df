//! Redis-backed admission control

mod in_memory;
mod limiter;
mod redis;

pub use in_memory::InMemoryCounterStore;
pub use limiter::ServiceRateLimiter;
pub use redis::{RedisCounterStore, RedisCounterStoreConfig};
