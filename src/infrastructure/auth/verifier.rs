//! Bearer token verification against the administrative secret and
//! per-service API keys.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tracing::{debug, error};

use crate::domain::auth::{AuthError, Credential, ServiceKeyResolver, TokenClaims};

/// Reserved issuer name for tokens signed with the administrative secret
pub const DEFAULT_ADMIN_ISSUER: &str = "notify-admin";

/// Verifier settings, injected once at construction
#[derive(Debug, Clone)]
pub struct TokenVerifierConfig {
    /// Process-wide administrative secret
    pub admin_secret: String,
    /// Issuer claim that selects the administrative credential class
    pub admin_issuer: String,
    /// Maximum accepted token age in seconds, measured from `iat`
    pub token_max_age_seconds: u64,
}

impl TokenVerifierConfig {
    pub fn new(admin_secret: impl Into<String>) -> Self {
        Self {
            admin_secret: admin_secret.into(),
            admin_issuer: DEFAULT_ADMIN_ISSUER.to_string(),
            token_max_age_seconds: 60,
        }
    }

    pub fn with_admin_issuer(mut self, admin_issuer: impl Into<String>) -> Self {
        self.admin_issuer = admin_issuer.into();
        self
    }

    pub fn with_token_max_age_seconds(mut self, token_max_age_seconds: u64) -> Self {
        self.token_max_age_seconds = token_max_age_seconds;
        self
    }
}

/// Verifies and classifies bearer tokens. The sole trust boundary of the
/// pipeline: pure over the injected secret material, it mints no tokens.
pub struct TokenVerifier {
    config: TokenVerifierConfig,
    resolver: Arc<dyn ServiceKeyResolver>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("admin_issuer", &self.config.admin_issuer)
            .field("token_max_age_seconds", &self.config.token_max_age_seconds)
            .field("admin_secret", &"[hidden]")
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(config: TokenVerifierConfig, resolver: Arc<dyn ServiceKeyResolver>) -> Self {
        Self { config, resolver }
    }

    /// Verifies a bearer token and returns the matched credential.
    ///
    /// The issuer claim selects the candidate secrets: the administrative
    /// secret for the reserved issuer, otherwise the active API keys of the
    /// service the issuer resolves to. The first signature match wins, then
    /// the token lifetime is checked with zero grace.
    pub async fn verify(&self, token: &str) -> Result<Credential, AuthError> {
        decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let claims = read_claims(token)?;

        let issuer = claims
            .iss
            .as_deref()
            .filter(|iss| !iss.is_empty())
            .ok_or(AuthError::MissingIssuer)?;

        if issuer == self.config.admin_issuer {
            if !signature_matches(token, &self.config.admin_secret) {
                return Err(AuthError::InvalidSignature);
            }
            self.check_lifetime(&claims)?;

            debug!(issuer, "verified administrative token");
            return Ok(Credential::Admin {
                issuer: issuer.to_string(),
            });
        }

        // Resolver outages fail closed: a caller we cannot identify is not
        // authenticated.
        let service = match self.resolver.resolve(issuer).await {
            Ok(service) => service,
            Err(err) => {
                error!(issuer, error = %err, "service key lookup failed");
                return Err(AuthError::UnknownIssuer);
            }
        };

        let Some(service) = service.filter(|service| service.active) else {
            return Err(AuthError::UnknownIssuer);
        };

        let matched_key = service
            .api_keys
            .iter()
            .filter(|key| key.is_active())
            .find(|key| signature_matches(token, &key.secret))
            .map(|key| key.id);

        match matched_key {
            Some(api_key_id) => {
                self.check_lifetime(&claims)?;

                debug!(issuer, %api_key_id, "verified service token");
                Ok(Credential::Service {
                    service,
                    api_key_id,
                })
            }
            None => Err(AuthError::InvalidSignature),
        }
    }

    /// Zero-grace expiry check; `iat` older than the configured max age is
    /// treated as expired as well.
    fn check_lifetime(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        let now = Utc::now().timestamp();

        if claims.exp <= now {
            return Err(AuthError::TokenExpired);
        }
        if now - claims.iat > self.config.token_max_age_seconds as i64 {
            return Err(AuthError::TokenExpired);
        }

        Ok(())
    }
}

/// Reads claims from the payload segment without trusting the signature.
/// The claims are only acted on after a candidate secret has verified the
/// token.
fn read_claims(token: &str) -> Result<TokenClaims, AuthError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(AuthError::MalformedToken),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::MalformedToken)?;

    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)
}

fn signature_matches(token: &str, secret: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::{ApiKeyRecord, MockServiceKeyResolver, ServiceId, ServiceRecord};
    use crate::domain::DomainError;
    use crate::infrastructure::auth::InMemoryServiceKeyRepository;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    const ADMIN_SECRET: &str = "test-admin-secret";
    const SERVICE_SECRET: &str = "test-service-secret";

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn fresh_claims(issuer: impl Into<String>) -> TokenClaims {
        let now = Utc::now().timestamp();
        TokenClaims {
            iss: Some(issuer.into()),
            iat: now,
            exp: now + 30,
        }
    }

    fn seeded_verifier() -> (TokenVerifier, ServiceId, Uuid) {
        let service_id = ServiceId::new(Uuid::new_v4());
        let api_key_id = Uuid::new_v4();

        let service = ServiceRecord::new(service_id, "test-service")
            .with_api_key(ApiKeyRecord::new(api_key_id, SERVICE_SECRET));
        let resolver = Arc::new(InMemoryServiceKeyRepository::with_services(vec![service]));

        let verifier = TokenVerifier::new(TokenVerifierConfig::new(ADMIN_SECRET), resolver);
        (verifier, service_id, api_key_id)
    }

    #[tokio::test]
    async fn test_admin_token_verifies_as_admin_class() {
        let (verifier, _, _) = seeded_verifier();
        let token = sign(&fresh_claims(DEFAULT_ADMIN_ISSUER), ADMIN_SECRET);

        let credential = verifier.verify(&token).await.unwrap();
        assert!(credential.is_admin());
    }

    #[tokio::test]
    async fn test_service_token_verifies_as_service_class() {
        let (verifier, service_id, api_key_id) = seeded_verifier();
        let token = sign(&fresh_claims(service_id.to_string()), SERVICE_SECRET);

        let credential = verifier.verify(&token).await.unwrap();
        match credential {
            Credential::Service {
                service,
                api_key_id: matched,
            } => {
                assert_eq!(service.id, service_id);
                assert_eq!(matched, api_key_id);
            }
            Credential::Admin { .. } => panic!("expected service credential"),
        }
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let (verifier, service_id, _) = seeded_verifier();
        let token = sign(&fresh_claims(service_id.to_string()), "wrong-secret");

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_admin_token_with_wrong_secret_rejected() {
        let (verifier, _, _) = seeded_verifier();
        let token = sign(&fresh_claims(DEFAULT_ADMIN_ISSUER), "wrong-secret");

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (verifier, _, _) = seeded_verifier();
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            iss: Some(DEFAULT_ADMIN_ISSUER.to_string()),
            iat: now - 120,
            exp: now - 60,
        };

        let token = sign(&claims, ADMIN_SECRET);
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_stale_iat_rejected() {
        let (verifier, _, _) = seeded_verifier();
        let now = Utc::now().timestamp();
        // Unexpired, but issued beyond the max token age
        let claims = TokenClaims {
            iss: Some(DEFAULT_ADMIN_ISSUER.to_string()),
            iat: now - 3600,
            exp: now + 3600,
        };

        let token = sign(&claims, ADMIN_SECRET);
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_missing_issuer_rejected() {
        let (verifier, _, _) = seeded_verifier();
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            iss: None,
            iat: now,
            exp: now + 30,
        };

        let token = sign(&claims, ADMIN_SECRET);
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::MissingIssuer
        );
    }

    #[tokio::test]
    async fn test_unknown_issuer_rejected() {
        let (verifier, _, _) = seeded_verifier();
        let token = sign(&fresh_claims(Uuid::new_v4().to_string()), SERVICE_SECRET);

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::UnknownIssuer
        );
    }

    #[tokio::test]
    async fn test_revoked_key_rejected() {
        let service_id = ServiceId::new(Uuid::new_v4());
        let service = ServiceRecord::new(service_id, "test-service")
            .with_api_key(ApiKeyRecord::new(Uuid::new_v4(), SERVICE_SECRET).revoked());
        let resolver = Arc::new(InMemoryServiceKeyRepository::with_services(vec![service]));
        let verifier = TokenVerifier::new(TokenVerifierConfig::new(ADMIN_SECRET), resolver);

        let token = sign(&fresh_claims(service_id.to_string()), SERVICE_SECRET);
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_inactive_service_rejected() {
        let service_id = ServiceId::new(Uuid::new_v4());
        let mut service = ServiceRecord::new(service_id, "test-service")
            .with_api_key(ApiKeyRecord::new(Uuid::new_v4(), SERVICE_SECRET));
        service.active = false;
        let resolver = Arc::new(InMemoryServiceKeyRepository::with_services(vec![service]));
        let verifier = TokenVerifier::new(TokenVerifierConfig::new(ADMIN_SECRET), resolver);

        let token = sign(&fresh_claims(service_id.to_string()), SERVICE_SECRET);
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::UnknownIssuer
        );
    }

    #[tokio::test]
    async fn test_resolver_failure_fails_closed() {
        let mut resolver = MockServiceKeyResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(DomainError::store("connection refused")));

        let verifier = TokenVerifier::new(TokenVerifierConfig::new(ADMIN_SECRET), Arc::new(resolver));
        let token = sign(&fresh_claims(Uuid::new_v4().to_string()), SERVICE_SECRET);

        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::UnknownIssuer
        );
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let (verifier, _, _) = seeded_verifier();

        assert_eq!(
            verifier.verify("not-a-token").await.unwrap_err(),
            AuthError::MalformedToken
        );
    }
}
