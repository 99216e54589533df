//! Application configuration loading

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, AwsSettings, DatabaseConfig, DispatchConfig, LogFormat, LoggingConfig,
    ProvidersConfig, RateLimitBackend, RateLimitSettings, RedisConfig, ServerConfig,
};
