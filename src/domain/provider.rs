//! Delivery provider abstraction: capability declaration, send operations,
//! and transient/permanent failure classification.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::notification::{DispatchRequest, NotificationChannel};

/// Provider acknowledgement of an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// Provider-assigned identifier, used to correlate delivery-status
    /// callbacks
    pub message_id: String,
}

impl ProviderResponse {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// Provider call failures, pre-classified for the retry loop
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider}: throttled: {message}")]
    Throttled { provider: &'static str, message: String },

    #[error("{provider}: transient failure: {message}")]
    Transient { provider: &'static str, message: String },

    #[error("{provider}: attempt timed out after {timeout_ms}ms")]
    Timeout { provider: &'static str, timeout_ms: u64 },

    #[error("{provider}: permanent failure: {message}")]
    Permanent { provider: &'static str, message: String },
}

impl ProviderError {
    pub fn throttled(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Throttled {
            provider,
            message: message.into(),
        }
    }

    pub fn transient(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            provider,
            message: message.into(),
        }
    }

    pub fn timeout(provider: &'static str, timeout: Duration) -> Self {
        Self::Timeout {
            provider,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn permanent(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Permanent {
            provider,
            message: message.into(),
        }
    }

    /// Permanent failures are surfaced immediately; everything else is
    /// eligible for the backoff loop.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Provider selection failures, surfaced as configuration-class errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no provider supports the {0} channel")]
    NoProviderForChannel(NotificationChannel),

    #[error("provider '{0}' is not registered")]
    UnknownProvider(String),
}

/// A concrete delivery backend (cloud SMS/email gateway)
#[async_trait]
pub trait NotificationProvider: Send + Sync + Debug {
    /// Registry identifier for this provider
    fn name(&self) -> &'static str;

    /// Channels this provider can deliver
    fn supports(&self, channel: NotificationChannel) -> bool;

    /// Send an SMS; the implementation must classify failures as
    /// transient or permanent.
    async fn send_sms(&self, request: &DispatchRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send an email; same classification contract as `send_sms`.
    async fn send_email(&self, request: &DispatchRequest)
        -> Result<ProviderResponse, ProviderError>;
}
