//! Notification Gateway API
//!
//! Authenticated admission and dispatch pipeline for SMS/email
//! notifications:
//! - Bearer token verification (administrative secret + per-service API keys)
//! - Redis-backed fixed-window rate limiting per service
//! - Provider abstraction with retry/backoff and failure classification

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use api::AppState;
use config::RateLimitBackend;
use domain::notification::NotificationChannel;
use domain::rate_limit::{CounterStore, RateLimitConfig};
use domain::{DispatchRecorder, ServiceKeyResolver};
use infrastructure::auth::{
    InMemoryServiceKeyRepository, PostgresServiceKeyRepository, TokenVerifier, TokenVerifierConfig,
};
use infrastructure::dispatch::{DispatchService, Dispatcher, InMemoryDispatchRecorder, RetryPolicy};
use infrastructure::providers::{AwsProvider, AwsProviderConfig, ProviderRegistry};
use infrastructure::rate_limit::{InMemoryCounterStore, RedisCounterStore, ServiceRateLimiter};

/// Create the application state with all services initialized
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    if config.auth.admin_secret.is_empty() {
        anyhow::bail!("auth.admin_secret must be configured (NOTIFY__AUTH__ADMIN_SECRET)");
    }

    // Rate limit counter store
    let counter_store: Arc<dyn CounterStore> = match config.rate_limit.backend {
        RateLimitBackend::Redis => {
            info!("Using Redis counter store at {}", config.redis.url);
            Arc::new(RedisCounterStore::with_url(config.redis.url.clone()).await?)
        }
        RateLimitBackend::Memory => {
            info!("Using in-memory counter store (single-instance only)");
            Arc::new(InMemoryCounterStore::new())
        }
    };

    let limiter = Arc::new(ServiceRateLimiter::new(
        counter_store.clone(),
        RateLimitConfig {
            limit: config.rate_limit.limit,
            window: Duration::from_secs(config.rate_limit.window_seconds),
            store_timeout: Duration::from_millis(config.rate_limit.store_timeout_ms),
            failure_policy: config.rate_limit.failure_policy,
        },
    ));

    // Service key resolution - PostgreSQL when configured
    let resolver: Arc<dyn ServiceKeyResolver> = match &config.database.url {
        Some(url) => {
            info!("Using PostgreSQL service key resolver");
            Arc::new(PostgresServiceKeyRepository::connect(url).await?)
        }
        None => {
            info!("Using in-memory service key resolver");
            Arc::new(InMemoryServiceKeyRepository::new())
        }
    };

    let verifier = Arc::new(TokenVerifier::new(
        TokenVerifierConfig::new(config.auth.admin_secret.clone())
            .with_admin_issuer(config.auth.admin_issuer.clone())
            .with_token_max_age_seconds(config.auth.token_max_age_seconds),
        resolver,
    ));

    // Delivery providers
    let aws_settings = &config.providers.aws;
    let mut aws_provider_config =
        AwsProviderConfig::new(aws_settings.region.clone(), aws_settings.email_from.clone());
    if let Some(sender_id) = &aws_settings.sms_sender_id {
        aws_provider_config = aws_provider_config.with_sms_sender_id(sender_id.clone());
    }
    let aws_provider = Arc::new(AwsProvider::from_config(aws_provider_config).await);

    let registry = Arc::new(
        ProviderRegistry::new()
            .with_provider(AwsProvider::NAME, aws_provider)
            .with_default(NotificationChannel::Sms, config.providers.default_sms.clone())
            .with_default(
                NotificationChannel::Email,
                config.providers.default_email.clone(),
            ),
    );

    let dispatcher = Arc::new(Dispatcher::new(RetryPolicy {
        max_attempts: config.dispatch.max_attempts,
        initial_backoff: Duration::from_millis(config.dispatch.initial_backoff_ms),
        max_backoff: Duration::from_millis(config.dispatch.max_backoff_ms),
        attempt_timeout: Duration::from_millis(config.dispatch.attempt_timeout_ms),
    }));

    // Dispatch results are handed to the external persistence layer in
    // production; the in-memory recorder backs the legacy read endpoint
    let recorder: Arc<dyn DispatchRecorder> = Arc::new(InMemoryDispatchRecorder::new());

    let dispatch_service = Arc::new(DispatchService::new(
        verifier,
        limiter,
        registry,
        dispatcher,
        recorder.clone(),
    ));

    Ok(AppState::new(dispatch_service, recorder, counter_store))
}
