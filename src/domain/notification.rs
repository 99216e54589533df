//! Dispatch request/result types and the recording contract for the
//! external persistence layer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::auth::AuthError;
use crate::domain::provider::SelectionError;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Sms,
    Email,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Message content produced by the external rendering collaborator
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub body: String,
}

/// A validated notification-send request. Owned by exactly one in-flight
/// dispatch and immutable once admitted.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub id: Uuid,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub template_id: Uuid,
    pub personalisation: Option<HashMap<String, String>>,
    pub reference: Option<String>,
    pub billing_code: Option<String>,
    pub callback_url: Option<String>,
    pub content: RenderedContent,
}

impl DispatchRequest {
    pub fn sms(recipient: impl Into<String>, template_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: NotificationChannel::Sms,
            recipient: recipient.into(),
            template_id,
            personalisation: None,
            reference: None,
            billing_code: None,
            callback_url: None,
            content: RenderedContent {
                subject: None,
                body: body.into(),
            },
        }
    }

    pub fn email(
        recipient: impl Into<String>,
        template_id: Uuid,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: NotificationChannel::Email,
            recipient: recipient.into(),
            template_id,
            personalisation: None,
            reference: None,
            billing_code: None,
            callback_url: None,
            content: RenderedContent {
                subject: Some(subject.into()),
                body: body.into(),
            },
        }
    }

    pub fn with_personalisation(mut self, personalisation: HashMap<String, String>) -> Self {
        self.personalisation = Some(personalisation);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_billing_code(mut self, billing_code: impl Into<String>) -> Self {
        self.billing_code = Some(billing_code.into());
        self
    }

    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }

    /// Reference handed to the provider for deduplication. Stable across
    /// every retry attempt of one logical request.
    pub fn client_reference(&self) -> String {
        self.reference
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Terminal status of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Accepted,
    Rejected,
    ProviderError,
}

/// Outcome of the dispatcher's provider-call loop
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    /// Failure was classified permanent and never retried
    pub permanent: bool,
    /// The last attempt exceeded its deadline
    pub timed_out: bool,
    pub attempts: u32,
}

impl DispatchResult {
    pub fn accepted(provider_message_id: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: DispatchStatus::Accepted,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
            permanent: false,
            timed_out: false,
            attempts,
        }
    }

    pub fn provider_error(
        error: impl Into<String>,
        permanent: bool,
        timed_out: bool,
        attempts: u32,
    ) -> Self {
        Self {
            status: DispatchStatus::ProviderError,
            provider_message_id: None,
            error: Some(error.into()),
            permanent,
            timed_out,
            attempts,
        }
    }
}

/// Concrete reason a request reached the `Rejected` terminal state
#[derive(Debug, Clone)]
pub enum RejectionReason {
    Auth(AuthError),
    RateLimited { retry_after: Duration },
    Selection(SelectionError),
    Provider {
        message: String,
        permanent: bool,
        timed_out: bool,
        attempts: u32,
    },
}

impl RejectionReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Auth(error) => error.reason_code(),
            Self::RateLimited { .. } => "rate_limited",
            Self::Selection(SelectionError::NoProviderForChannel(_)) => "no_provider_for_channel",
            Self::Selection(SelectionError::UnknownProvider(_)) => "unknown_provider",
            Self::Provider { permanent: true, .. } => "provider_permanent_failure",
            Self::Provider { .. } => "provider_retries_exhausted",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(error) => error.fmt(f),
            Self::RateLimited { retry_after } => {
                write!(f, "rate limit exceeded, retry after {}s", retry_after.as_secs())
            }
            Self::Selection(error) => error.fmt(f),
            Self::Provider {
                message, attempts, ..
            } => write!(f, "provider failure after {} attempt(s): {}", attempts, message),
        }
    }
}

/// Terminal outcome of one request through the admission pipeline
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Completed(DispatchResult),
    Rejected(RejectionReason),
}

impl DispatchOutcome {
    pub fn status(&self) -> DispatchStatus {
        match self {
            Self::Completed(result) => result.status,
            Self::Rejected(RejectionReason::Provider { .. }) => DispatchStatus::ProviderError,
            Self::Rejected(_) => DispatchStatus::Rejected,
        }
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(reason) => Some(reason.reason_code()),
        }
    }

    pub fn provider_message_id(&self) -> Option<&str> {
        match self {
            Self::Completed(result) => result.provider_message_id.as_deref(),
            Self::Rejected(_) => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed(result) => result.attempts,
            Self::Rejected(RejectionReason::Provider { attempts, .. }) => *attempts,
            Self::Rejected(_) => 0,
        }
    }
}

/// A dispatch as handed to the persistence layer for audit and status
/// tracking
#[derive(Debug, Clone, Serialize)]
pub struct RecordedDispatch {
    pub id: Uuid,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub reference: Option<String>,
    pub billing_code: Option<String>,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl RecordedDispatch {
    pub fn from_outcome(request: &DispatchRequest, outcome: &DispatchOutcome) -> Self {
        Self {
            id: request.id,
            channel: request.channel,
            recipient: request.recipient.clone(),
            reference: request.reference.clone(),
            billing_code: request.billing_code.clone(),
            status: outcome.status(),
            reason: outcome.reason_code().map(str::to_string),
            provider_message_id: outcome.provider_message_id().map(str::to_string),
            attempts: outcome.attempts(),
            created_at: Utc::now(),
        }
    }
}

/// Hands terminal outcomes to the external persistence layer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DispatchRecorder: Send + Sync {
    /// Persists a terminal dispatch outcome
    async fn record(&self, entry: RecordedDispatch) -> Result<(), DomainError>;

    /// Looks up a previously recorded dispatch
    async fn get(&self, id: Uuid) -> Result<Option<RecordedDispatch>, DomainError>;
}
