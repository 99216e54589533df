//! Provider-call retry loop: exponential backoff around transient failures

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::notification::{DispatchRequest, DispatchResult, NotificationChannel};
use crate::domain::provider::{NotificationProvider, ProviderError, ProviderResponse};

/// Retry settings for one logical dispatch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt ceiling, including the first attempt
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for each individual provider call
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }
}

/// Retry decorator over raw provider calls.
///
/// Providers classify their own failures; this loop only decides whether to
/// try again. It keeps no state between dispatches.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Runs provider attempts until acceptance, a permanent failure, or the
    /// attempt ceiling. Each attempt carries the same client reference so a
    /// deduplicating provider sees one logical request.
    pub async fn dispatch(
        &self,
        provider: Arc<dyn NotificationProvider>,
        request: &DispatchRequest,
    ) -> DispatchResult {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let send = send_once(provider.as_ref(), request);
            let result = match tokio::time::timeout(self.policy.attempt_timeout, send).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(
                    provider.name(),
                    self.policy.attempt_timeout,
                )),
            };

            match result {
                Ok(response) => {
                    info!(
                        notification_id = %request.id,
                        provider = provider.name(),
                        message_id = %response.message_id,
                        attempt,
                        "provider accepted notification"
                    );
                    return DispatchResult::accepted(response.message_id, attempt);
                }
                Err(err) if !err.is_retryable() => {
                    warn!(
                        notification_id = %request.id,
                        provider = provider.name(),
                        error = %err,
                        "permanent provider failure"
                    );
                    return DispatchResult::provider_error(err.to_string(), true, false, attempt);
                }
                Err(err) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            notification_id = %request.id,
                            provider = provider.name(),
                            error = %err,
                            attempts = attempt,
                            "provider retries exhausted"
                        );
                        return DispatchResult::provider_error(
                            err.to_string(),
                            false,
                            err.is_timeout(),
                            attempt,
                        );
                    }

                    info!(
                        notification_id = %request.id,
                        provider = provider.name(),
                        error = %err,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient provider failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.policy.max_backoff);
                }
            }
        }
    }
}

async fn send_once(
    provider: &dyn NotificationProvider,
    request: &DispatchRequest,
) -> Result<ProviderResponse, ProviderError> {
    match request.channel {
        NotificationChannel::Sms => provider.send_sms(request).await,
        NotificationChannel::Email => provider.send_email(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::DispatchStatus;
    use crate::domain::provider::mock::MockProvider;
    use uuid::Uuid;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3).with_backoff(Duration::from_millis(1), Duration::from_millis(4))
    }

    fn sms_request() -> DispatchRequest {
        DispatchRequest::sms("+18005550101", Uuid::new_v4(), "hello")
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let provider = Arc::new(MockProvider::new("mock"));
        let dispatcher = Dispatcher::new(fast_policy());

        let result = dispatcher.dispatch(provider, &sms_request()).await;

        assert_eq!(result.status, DispatchStatus::Accepted);
        assert_eq!(result.attempts, 1);
        assert!(result.provider_message_id.is_some());
    }

    #[tokio::test]
    async fn test_throttled_twice_then_success() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_result(Err(ProviderError::throttled("mock", "slow down")))
                .with_result(Err(ProviderError::throttled("mock", "slow down")))
                .with_result(Ok(ProviderResponse::new("message-3"))),
        );
        let dispatcher = Dispatcher::new(fast_policy());

        let result = dispatcher.dispatch(provider, &sms_request()).await;

        assert_eq!(result.status, DispatchStatus::Accepted);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.provider_message_id.as_deref(), Some("message-3"));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_result(Err(ProviderError::permanent("mock", "invalid recipient"))),
        );
        let dispatcher = Dispatcher::new(fast_policy());

        let result = dispatcher.dispatch(provider.clone(), &sms_request()).await;

        assert_eq!(result.status, DispatchStatus::ProviderError);
        assert!(result.permanent);
        assert_eq!(result.attempts, 1);
        assert_eq!(provider.seen_references().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempt_count() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_result(Err(ProviderError::transient("mock", "internal error")))
                .with_result(Err(ProviderError::transient("mock", "internal error")))
                .with_result(Err(ProviderError::transient("mock", "internal error"))),
        );
        let dispatcher = Dispatcher::new(fast_policy());

        let result = dispatcher.dispatch(provider, &sms_request()).await;

        assert_eq!(result.status, DispatchStatus::ProviderError);
        assert!(!result.permanent);
        assert_eq!(result.attempts, 3);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_same_reference_on_every_attempt() {
        let provider = Arc::new(
            MockProvider::new("mock")
                .with_result(Err(ProviderError::throttled("mock", "slow down")))
                .with_result(Err(ProviderError::throttled("mock", "slow down")))
                .with_result(Ok(ProviderResponse::new("message-3"))),
        );
        let dispatcher = Dispatcher::new(fast_policy());

        let request = sms_request().with_reference("claim-42");
        dispatcher.dispatch(provider.clone(), &request).await;

        let references = provider.seen_references();
        assert_eq!(references, vec!["claim-42", "claim-42", "claim-42"]);
    }

    #[tokio::test]
    async fn test_attempt_deadline_counts_as_transient() {
        #[derive(Debug)]
        struct HangingProvider;

        #[async_trait::async_trait]
        impl NotificationProvider for HangingProvider {
            fn name(&self) -> &'static str {
                "hanging"
            }

            fn supports(&self, _channel: NotificationChannel) -> bool {
                true
            }

            async fn send_sms(
                &self,
                _request: &DispatchRequest,
            ) -> Result<ProviderResponse, ProviderError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ProviderResponse::new("never"))
            }

            async fn send_email(
                &self,
                _request: &DispatchRequest,
            ) -> Result<ProviderResponse, ProviderError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ProviderResponse::new("never"))
            }
        }

        let dispatcher = Dispatcher::new(
            RetryPolicy::new(2)
                .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
                .with_attempt_timeout(Duration::from_millis(20)),
        );

        let result = dispatcher
            .dispatch(Arc::new(HangingProvider), &sms_request())
            .await;

        assert_eq!(result.status, DispatchStatus::ProviderError);
        assert!(result.timed_out);
        assert_eq!(result.attempts, 2);
    }
}
