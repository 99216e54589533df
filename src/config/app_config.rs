use serde::Deserialize;

use crate::domain::rate_limit::FailurePolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Process-wide administrative secret; must be set in production
    pub admin_secret: String,
    /// Issuer claim that selects the administrative credential class
    pub admin_issuer: String,
    /// Maximum accepted token age in seconds
    pub token_max_age_seconds: u64,
}

/// Counter store backend for the rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Process-local counters; suitable for tests and single-instance
    /// deployments only
    #[default]
    Memory,
    /// Shared Redis counters; required for multi-instance deployments
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub backend: RateLimitBackend,
    /// Requests admitted per service per window
    pub limit: u64,
    /// Observation window length in seconds
    pub window_seconds: u64,
    /// Deadline for one counter-store round trip, in milliseconds
    pub store_timeout_ms: u64,
    /// Behavior when the counter store is unreachable. The default denies
    /// admission (fail closed); set to "fail_open" to admit instead.
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL for service/API-key resolution. Unset selects the
    /// in-memory resolver.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Default provider id per channel
    pub default_sms: String,
    pub default_email: String,
    pub aws: AwsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    pub region: String,
    pub sms_sender_id: Option<String>,
    pub email_from: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_secret: String::new(),
            admin_issuer: "notify-admin".to_string(),
            token_max_age_seconds: 60,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            backend: RateLimitBackend::default(),
            limit: 5,
            window_seconds: 30,
            store_timeout_ms: 3000,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_sms: "aws".to_string(),
            default_email: "aws".to_string(),
            aws: AwsSettings::default(),
        }
    }
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            sms_sender_id: None,
            email_from: "no-reply@notifications.example.gov".to_string(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
            attempt_timeout_ms: 15000,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("NOTIFY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limit.limit, 5);
        assert_eq!(config.rate_limit.window_seconds, 30);
        assert_eq!(config.rate_limit.backend, RateLimitBackend::Memory);
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.auth.admin_issuer, "notify-admin");
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"rate_limit": {"limit": 10}}"#).unwrap();
        assert_eq!(config.rate_limit.limit, 10);
        assert_eq!(config.rate_limit.window_seconds, 30);
        assert_eq!(config.server.port, 8080);
    }
}
