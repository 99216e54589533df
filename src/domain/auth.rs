//! Caller identity: credential classes, token claims, and the service key
//! lookup contract used by the token verifier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::notification::NotificationChannel;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Identity of a registered sending service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Uuid);

impl ServiceId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse a service id from a token issuer claim
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single API key issued to a service
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub secret: String,
    pub revoked: bool,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn new(id: Uuid, secret: impl Into<String>) -> Self {
        Self {
            id,
            secret: secret.into(),
            revoked: false,
            expiry_date: None,
        }
    }

    pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }

    /// A key can sign tokens only while unrevoked and unexpired
    pub fn is_active(&self) -> bool {
        !self.revoked && self.expiry_date.is_none_or(|expiry| expiry > Utc::now())
    }
}

/// A service as resolved from the external persistence layer, carrying the
/// key material and delivery configuration the admission pipeline needs.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    pub active: bool,
    pub api_keys: Vec<ApiKeyRecord>,
    /// Provider pinned for SMS delivery, overriding the channel default
    pub sms_provider: Option<String>,
    /// Provider pinned for email delivery, overriding the channel default
    pub email_provider: Option<String>,
}

impl ServiceRecord {
    pub fn new(id: ServiceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            api_keys: Vec::new(),
            sms_provider: None,
            email_provider: None,
        }
    }

    pub fn with_api_key(mut self, key: ApiKeyRecord) -> Self {
        self.api_keys.push(key);
        self
    }

    pub fn with_sms_provider(mut self, provider: impl Into<String>) -> Self {
        self.sms_provider = Some(provider.into());
        self
    }

    pub fn with_email_provider(mut self, provider: impl Into<String>) -> Self {
        self.email_provider = Some(provider.into());
        self
    }

    pub fn provider_override(&self, channel: NotificationChannel) -> Option<&str> {
        match channel {
            NotificationChannel::Sms => self.sms_provider.as_deref(),
            NotificationChannel::Email => self.email_provider.as_deref(),
        }
    }
}

/// Verified caller identity. Exactly one class is matched per request.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Token signed with the process-wide administrative secret
    Admin { issuer: String },
    /// Token signed with one of a service's active API keys
    Service {
        service: ServiceRecord,
        api_key_id: Uuid,
    },
}

impl Credential {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    /// The resolved service record, when the caller is a service
    pub fn service(&self) -> Option<&ServiceRecord> {
        match self {
            Self::Admin { .. } => None,
            Self::Service { service, .. } => Some(service),
        }
    }
}

/// Claims carried by a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer: the reserved administrative name or a service id
    pub iss: Option<String>,
    /// Issued-at, Unix epoch seconds
    pub iat: i64,
    /// Expiry, Unix epoch seconds
    pub exp: i64,
}

/// Token verification failures. Never retried, always surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token is structurally invalid")]
    MalformedToken,

    #[error("token signature does not match any known secret")]
    InvalidSignature,

    #[error("token has expired")]
    TokenExpired,

    #[error("token is missing the issuer claim")]
    MissingIssuer,

    #[error("token issuer is not a known service")]
    UnknownIssuer,
}

impl AuthError {
    /// Stable reason code recorded for audit and returned to the caller
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::MissingIssuer => "missing_issuer",
            Self::UnknownIssuer => "unknown_issuer",
        }
    }
}

/// Resolves a token issuer to the service record holding its API keys.
///
/// Backed by the external persistence layer in production; the in-memory
/// implementation serves tests and local development.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceKeyResolver: Send + Sync {
    /// Returns the service for the issuer, or `None` when no active service
    /// matches.
    async fn resolve(&self, issuer: &str) -> Result<Option<ServiceRecord>, DomainError>;
}
