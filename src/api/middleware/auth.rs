//! Bearer token extraction middleware

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::api::types::ApiError;

/// Extractor pulling the raw bearer token from the `Authorization` header.
///
/// Verification happens in the dispatch pipeline, which owns the
/// authentication error taxonomy; this extractor only rejects requests with
/// no usable bearer token at all.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_bearer_token(&parts.headers).map(BearerToken)
    }
}

fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Result<String, ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Bearer token required"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::bad_request("Invalid Authorization header encoding"))?;

    auth_str
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError::unauthorized("Authorization header must be 'Bearer <token>'")
        })
}
