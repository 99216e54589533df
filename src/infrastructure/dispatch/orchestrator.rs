//! Request orchestration: verify, admit, select, dispatch.
//!
//! State machine per request:
//! `Received -> Authenticated -> Admitted -> Dispatched -> {Completed, Rejected}`.
//! Terminal states are final; no retries happen above the dispatcher's own
//! loop.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::auth::{AuthError, Credential};
use crate::domain::notification::{
    DispatchOutcome, DispatchRecorder, DispatchRequest, DispatchStatus, RecordedDispatch,
    RejectionReason,
};
use crate::domain::rate_limit::Admission;
use crate::infrastructure::auth::TokenVerifier;
use crate::infrastructure::dispatch::Dispatcher;
use crate::infrastructure::providers::ProviderRegistry;
use crate::infrastructure::rate_limit::ServiceRateLimiter;

/// Composes the admission pipeline. The only component that knows every
/// collaborator.
pub struct DispatchService {
    verifier: Arc<TokenVerifier>,
    limiter: Arc<ServiceRateLimiter>,
    registry: Arc<ProviderRegistry>,
    dispatcher: Arc<Dispatcher>,
    recorder: Arc<dyn DispatchRecorder>,
}

impl std::fmt::Debug for DispatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchService")
            .field("verifier", &self.verifier)
            .field("limiter", &self.limiter)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl DispatchService {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        limiter: Arc<ServiceRateLimiter>,
        registry: Arc<ProviderRegistry>,
        dispatcher: Arc<Dispatcher>,
        recorder: Arc<dyn DispatchRecorder>,
    ) -> Self {
        Self {
            verifier,
            limiter,
            registry,
            dispatcher,
            recorder,
        }
    }

    /// Verifies a bearer token without dispatching, for read endpoints
    pub async fn authenticate(&self, token: &str) -> Result<Credential, AuthError> {
        self.verifier.verify(token).await
    }

    /// Runs one request through the full pipeline and returns its terminal
    /// outcome. Every outcome is recorded for audit before it is returned.
    pub async fn handle(&self, token: &str, request: DispatchRequest) -> DispatchOutcome {
        // Received -> Authenticated
        let credential = match self.verifier.verify(token).await {
            Ok(credential) => credential,
            Err(err) => {
                return self
                    .finish(&request, DispatchOutcome::Rejected(RejectionReason::Auth(err)))
                    .await;
            }
        };

        // Authenticated -> Admitted. Administrative tokens carry no service
        // identity to key a counter on, so only service callers are limited.
        if let Some(service) = credential.service() {
            if let Admission::Denied { retry_after } = self.limiter.admit(&service.id).await {
                return self
                    .finish(
                        &request,
                        DispatchOutcome::Rejected(RejectionReason::RateLimited { retry_after }),
                    )
                    .await;
            }
        }

        // Admitted -> Dispatched
        let provider = match self.registry.select(request.channel, credential.service()) {
            Ok(provider) => provider,
            Err(err) => {
                return self
                    .finish(
                        &request,
                        DispatchOutcome::Rejected(RejectionReason::Selection(err)),
                    )
                    .await;
            }
        };

        // The provider call runs on its own task: a caller that disconnects
        // must not cancel a send already in flight, or the delivery state
        // becomes unknowable.
        let dispatcher = self.dispatcher.clone();
        let dispatch_request = request.clone();
        let dispatch = tokio::spawn(async move {
            dispatcher.dispatch(provider, &dispatch_request).await
        });

        let outcome = match dispatch.await {
            Ok(result) if result.status == DispatchStatus::Accepted => {
                DispatchOutcome::Completed(result)
            }
            Ok(result) => DispatchOutcome::Rejected(RejectionReason::Provider {
                message: result.error.unwrap_or_else(|| "provider failure".to_string()),
                permanent: result.permanent,
                timed_out: result.timed_out,
                attempts: result.attempts,
            }),
            Err(err) => DispatchOutcome::Rejected(RejectionReason::Provider {
                message: format!("dispatch task failed: {}", err),
                permanent: false,
                timed_out: false,
                attempts: 0,
            }),
        };

        self.finish(&request, outcome).await
    }

    /// Records the terminal outcome; recording failures are logged, never
    /// surfaced to the caller.
    async fn finish(&self, request: &DispatchRequest, outcome: DispatchOutcome) -> DispatchOutcome {
        let status = outcome.status();

        info!(
            notification_id = %request.id,
            channel = %request.channel,
            status = ?status,
            reason = outcome.reason_code().unwrap_or("none"),
            "dispatch finished"
        );
        metrics::counter!(
            "notify_dispatch_total",
            "channel" => request.channel.to_string(),
            "status" => status_label(status)
        )
        .increment(1);

        let entry = RecordedDispatch::from_outcome(request, &outcome);
        if let Err(err) = self.recorder.record(entry).await {
            error!(notification_id = %request.id, error = %err, "failed to record dispatch");
        }

        outcome
    }
}

fn status_label(status: DispatchStatus) -> &'static str {
    match status {
        DispatchStatus::Accepted => "accepted",
        DispatchStatus::Rejected => "rejected",
        DispatchStatus::ProviderError => "provider_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::{ApiKeyRecord, ServiceId, ServiceRecord, TokenClaims};
    use crate::domain::notification::{MockDispatchRecorder, NotificationChannel};
    use crate::domain::provider::mock::MockProvider;
    use crate::domain::provider::{ProviderError, ProviderResponse};
    use crate::domain::rate_limit::RateLimitConfig;
    use crate::infrastructure::auth::{
        InMemoryServiceKeyRepository, TokenVerifierConfig, DEFAULT_ADMIN_ISSUER,
    };
    use crate::infrastructure::dispatch::{InMemoryDispatchRecorder, RetryPolicy};
    use crate::infrastructure::rate_limit::InMemoryCounterStore;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::Duration;
    use uuid::Uuid;

    const ADMIN_SECRET: &str = "test-admin-secret";
    const SERVICE_SECRET: &str = "test-service-secret";

    struct Fixture {
        service: Arc<DispatchService>,
        service_id: ServiceId,
        provider: Arc<MockProvider>,
        recorder: Arc<InMemoryDispatchRecorder>,
    }

    fn fixture_with_provider(provider: MockProvider) -> Fixture {
        let service_id = ServiceId::new(Uuid::new_v4());
        let service_record = ServiceRecord::new(service_id, "test-service")
            .with_api_key(ApiKeyRecord::new(Uuid::new_v4(), SERVICE_SECRET));

        let resolver = Arc::new(InMemoryServiceKeyRepository::with_services(vec![
            service_record,
        ]));
        let verifier = Arc::new(TokenVerifier::new(
            TokenVerifierConfig::new(ADMIN_SECRET),
            resolver,
        ));

        let limiter = Arc::new(ServiceRateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitConfig::new(5, Duration::from_secs(10)),
        ));

        let provider = Arc::new(provider);
        let registry = Arc::new(
            ProviderRegistry::new()
                .with_provider("mock", provider.clone() as Arc<dyn crate::domain::NotificationProvider>)
                .with_default(NotificationChannel::Sms, "mock")
                .with_default(NotificationChannel::Email, "mock"),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            RetryPolicy::new(3).with_backoff(Duration::from_millis(1), Duration::from_millis(4)),
        ));

        let recorder = Arc::new(InMemoryDispatchRecorder::new());

        Fixture {
            service: Arc::new(DispatchService::new(
                verifier,
                limiter,
                registry,
                dispatcher,
                recorder.clone(),
            )),
            service_id,
            provider,
            recorder,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_provider(MockProvider::new("mock"))
    }

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn service_token(service_id: ServiceId) -> String {
        let now = Utc::now().timestamp();
        sign(
            &TokenClaims {
                iss: Some(service_id.to_string()),
                iat: now,
                exp: now + 30,
            },
            SERVICE_SECRET,
        )
    }

    fn expired_token(service_id: ServiceId) -> String {
        let now = Utc::now().timestamp();
        sign(
            &TokenClaims {
                iss: Some(service_id.to_string()),
                iat: now - 120,
                exp: now - 60,
            },
            SERVICE_SECRET,
        )
    }

    fn sms_request() -> DispatchRequest {
        DispatchRequest::sms("+18005550101", Uuid::new_v4(), "hello")
    }

    /// Sleep past the next window boundary so a burst of requests cannot
    /// straddle two rate-limit windows mid-test
    async fn align_to_window(window: Duration) {
        use std::time::{SystemTime, UNIX_EPOCH};

        let window_ms = window.as_millis().max(1) as u64;
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let into_window = now_ms % window_ms;
        if window_ms - into_window < 500 {
            tokio::time::sleep(Duration::from_millis(window_ms - into_window + 5)).await;
        }
    }

    #[tokio::test]
    async fn test_valid_service_token_completes() {
        let fixture = fixture();
        let token = service_token(fixture.service_id);

        let outcome = fixture.service.handle(&token, sms_request()).await;

        match outcome {
            DispatchOutcome::Completed(result) => {
                assert!(!result.provider_message_id.unwrap().is_empty());
            }
            DispatchOutcome::Rejected(reason) => panic!("unexpected rejection: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let fixture = fixture();
        let token = expired_token(fixture.service_id);
        let request = sms_request();
        let notification_id = request.id;

        let outcome = fixture.service.handle(&token, request).await;

        match outcome {
            DispatchOutcome::Rejected(RejectionReason::Auth(AuthError::TokenExpired)) => {}
            other => panic!("expected token_expired rejection, got {:?}", other),
        }

        // The rejection is recorded for audit with its reason code
        let recorded = fixture
            .recorder
            .get(notification_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded.reason.as_deref(), Some("token_expired"));
    }

    #[tokio::test]
    async fn test_sixth_request_rate_limited() {
        let fixture = fixture();
        let token = service_token(fixture.service_id);
        align_to_window(Duration::from_secs(10)).await;

        for _ in 0..5 {
            let outcome = fixture.service.handle(&token, sms_request()).await;
            assert!(matches!(outcome, DispatchOutcome::Completed(_)));
        }

        let outcome = fixture.service.handle(&token, sms_request()).await;
        match outcome {
            DispatchOutcome::Rejected(RejectionReason::RateLimited { retry_after }) => {
                assert!(retry_after <= Duration::from_secs(10));
            }
            other => panic!("expected rate limit rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admin_token_bypasses_rate_limit() {
        let fixture = fixture();
        let now = Utc::now().timestamp();
        let token = sign(
            &TokenClaims {
                iss: Some(DEFAULT_ADMIN_ISSUER.to_string()),
                iat: now,
                exp: now + 30,
            },
            ADMIN_SECRET,
        );

        for _ in 0..10 {
            let outcome = fixture.service.handle(&token, sms_request()).await;
            assert!(matches!(outcome, DispatchOutcome::Completed(_)));
        }
    }

    #[tokio::test]
    async fn test_throttled_provider_succeeds_on_third_attempt() {
        let fixture = fixture_with_provider(
            MockProvider::new("mock")
                .with_result(Err(ProviderError::throttled("mock", "slow down")))
                .with_result(Err(ProviderError::throttled("mock", "slow down")))
                .with_result(Ok(ProviderResponse::new("message-3"))),
        );
        let token = service_token(fixture.service_id);

        let outcome = fixture.service.handle(&token, sms_request()).await;

        match outcome {
            DispatchOutcome::Completed(result) => {
                assert_eq!(result.attempts, 3);
                assert_eq!(result.provider_message_id.as_deref(), Some("message-3"));
            }
            DispatchOutcome::Rejected(reason) => panic!("unexpected rejection: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_exhausted_provider_rejects_with_reason() {
        let fixture = fixture_with_provider(
            MockProvider::new("mock")
                .with_result(Err(ProviderError::transient("mock", "internal error")))
                .with_result(Err(ProviderError::transient("mock", "internal error")))
                .with_result(Err(ProviderError::transient("mock", "internal error"))),
        );
        let token = service_token(fixture.service_id);

        let outcome = fixture.service.handle(&token, sms_request()).await;

        match outcome {
            DispatchOutcome::Rejected(RejectionReason::Provider {
                permanent, attempts, ..
            }) => {
                assert!(!permanent);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected provider rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_channel_is_selection_error() {
        let fixture = fixture_with_provider(
            MockProvider::new("mock").with_channels(vec![NotificationChannel::Sms]),
        );
        let token = service_token(fixture.service_id);
        let request =
            DispatchRequest::email("veteran@example.com", Uuid::new_v4(), "subject", "body");

        let outcome = fixture.service.handle(&token, request).await;

        match outcome {
            DispatchOutcome::Rejected(RejectionReason::Selection(_)) => {}
            other => panic!("expected selection rejection, got {:?}", other),
        }
        // Provider was never invoked
        assert!(fixture.provider.seen_references().is_empty());
    }

    #[tokio::test]
    async fn test_recording_failure_does_not_fail_request() {
        let service_id = ServiceId::new(Uuid::new_v4());
        let service_record = ServiceRecord::new(service_id, "test-service")
            .with_api_key(ApiKeyRecord::new(Uuid::new_v4(), SERVICE_SECRET));
        let resolver = Arc::new(InMemoryServiceKeyRepository::with_services(vec![
            service_record,
        ]));

        let mut recorder = MockDispatchRecorder::new();
        recorder
            .expect_record()
            .returning(|_| Err(crate::domain::DomainError::store("write failed")));

        let service = DispatchService::new(
            Arc::new(TokenVerifier::new(
                TokenVerifierConfig::new(ADMIN_SECRET),
                resolver,
            )),
            Arc::new(ServiceRateLimiter::new(
                Arc::new(InMemoryCounterStore::new()),
                RateLimitConfig::new(5, Duration::from_secs(10)),
            )),
            Arc::new(
                ProviderRegistry::new()
                    .with_provider(
                        "mock",
                        Arc::new(MockProvider::new("mock"))
                            as Arc<dyn crate::domain::NotificationProvider>,
                    )
                    .with_default(NotificationChannel::Sms, "mock"),
            ),
            Arc::new(Dispatcher::new(RetryPolicy::default())),
            Arc::new(recorder),
        );

        let outcome = service
            .handle(&service_token(service_id), sms_request())
            .await;
        assert!(matches!(outcome, DispatchOutcome::Completed(_)));
    }
}
