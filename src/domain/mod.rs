//! Domain types and contracts for the admission and dispatch pipeline

pub mod auth;
pub mod error;
pub mod notification;
pub mod provider;
pub mod rate_limit;

pub use auth::{
    ApiKeyRecord, AuthError, Credential, ServiceId, ServiceKeyResolver, ServiceRecord, TokenClaims,
};
pub use error::DomainError;
pub use notification::{
    DispatchOutcome, DispatchRecorder, DispatchRequest, DispatchResult, DispatchStatus,
    NotificationChannel, RecordedDispatch, RejectionReason, RenderedContent,
};
pub use provider::{NotificationProvider, ProviderError, ProviderResponse, SelectionError};
pub use rate_limit::{Admission, CounterStore, FailurePolicy, RateLimitConfig};
