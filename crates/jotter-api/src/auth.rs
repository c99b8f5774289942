//! Bearer token authentication.
//!
//! Tokens are OIDC-style JWTs. Only the `sub` claim and an optional
//! display-name claim are consumed; everything else is ignored. Keys come
//! from a JWKS endpoint (fetched once at startup) or, for development, an
//! HS256 shared secret.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use jotter_core::{Error, Identity, Result};

use crate::config::{AuthSettings, KeySource, DEFAULT_DISPLAY_NAME_CLAIM};
use crate::error::ApiError;
use crate::state::AppState;

/// Token claims. Unknown claims land in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

enum VerificationKeys {
    Shared(DecodingKey),
    Jwks(JwkSet),
}

/// Validates bearer tokens and resolves them to an [`Identity`].
pub struct TokenVerifier {
    keys: VerificationKeys,
    issuer: Option<String>,
    audience: Option<String>,
    display_name_claim: String,
}

fn unauthorized(msg: impl Into<String>) -> Error {
    Error::Unauthorized(msg.into())
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

impl TokenVerifier {
    /// Verifier for HS256 tokens signed with a shared secret.
    pub fn with_secret(secret: &str) -> Self {
        Self::from_keys(VerificationKeys::Shared(DecodingKey::from_secret(
            secret.as_bytes(),
        )))
    }

    /// Verifier over an already loaded key set.
    pub fn with_jwks(jwks: JwkSet) -> Self {
        Self::from_keys(VerificationKeys::Jwks(jwks))
    }

    fn from_keys(keys: VerificationKeys) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
            display_name_claim: DEFAULT_DISPLAY_NAME_CLAIM.to_string(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_display_name_claim(mut self, claim: impl Into<String>) -> Self {
        self.display_name_claim = claim.into();
        self
    }

    /// Build the verifier from settings, fetching the JWKS if configured.
    pub async fn from_settings(settings: &AuthSettings, client: &reqwest::Client) -> Result<Self> {
        let verifier = match &settings.keys {
            KeySource::Secret(secret) => Self::with_secret(secret),
            KeySource::Jwks(url) => Self::with_jwks(fetch_jwks(client, url).await?),
        };

        let mut verifier = verifier.with_display_name_claim(&settings.display_name_claim);
        if let Some(issuer) = &settings.issuer {
            verifier = verifier.with_issuer(issuer);
        }
        if let Some(audience) = &settings.audience {
            verifier = verifier.with_audience(audience);
        }
        Ok(verifier)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        validation
    }

    fn decode_claims(&self, token: &str) -> Result<Claims> {
        let (key, validation) = match &self.keys {
            VerificationKeys::Shared(key) => (key.clone(), self.validation(Algorithm::HS256)),
            VerificationKeys::Jwks(set) => {
                let header = decode_header(token)
                    .map_err(|e| unauthorized(format!("Malformed token: {}", e)))?;
                if !is_asymmetric(header.alg) {
                    return Err(unauthorized(format!(
                        "Unsupported token algorithm {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| unauthorized("Token has no key id"))?;
                let jwk = set
                    .find(&kid)
                    .ok_or_else(|| unauthorized(format!("Unknown signing key '{}'", kid)))?;
                let key = DecodingKey::from_jwk(jwk)
                    .map_err(|e| unauthorized(format!("Unusable signing key '{}': {}", kid, e)))?;
                (key, self.validation(header.alg))
            }
        };

        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    unauthorized("Token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    unauthorized("Token signature is invalid")
                }
                _ => unauthorized(format!("Token validation failed: {}", e)),
            })
    }

    /// Verify `token` and return the caller's identity.
    ///
    /// Every failure is `Error::Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let claims = self.decode_claims(token)?;
        if claims.sub.trim().is_empty() {
            return Err(unauthorized("Token has an empty subject"));
        }

        let display_name = claims
            .extra
            .get(&self.display_name_claim)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Identity {
            subject: claims.sub,
            display_name,
        })
    }
}

/// Download the key set from an OIDC JWKS endpoint.
pub async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<JwkSet> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Config(format!("failed to fetch JWKS from {}: {}", url, e)))?;

    let set: JwkSet = response
        .json()
        .await
        .map_err(|e| Error::Config(format!("invalid JWKS document at {}: {}", url, e)))?;

    info!(
        subsystem = "auth",
        jwks_url = %url,
        key_count = set.keys.len(),
        "Loaded token signing keys"
    );
    Ok(set)
}

/// The authenticated caller of a request.
///
/// Rejects with 401 when the `Authorization: Bearer` header is missing or
/// the token does not verify.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        let identity = state.verifier.verify(token).map_err(|e| {
            debug!(subsystem = "auth", error = %e, "Rejected bearer token");
            ApiError::from(e)
        })?;

        Ok(AuthenticatedUser(identity))
    }
}
