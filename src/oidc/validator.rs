//! Bearer token validation.

use anyhow::Result;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bearer::extract_bearer_token;
use super::claims::ValidatedClaims;
use super::jwks::{find_key, JwksCache, JwksFetcher, KeySource, SigningKey};
use crate::config::{AuthConfig, MAX_CLOCK_SKEW_SECS};
use crate::error::AuthError;

/// The only accepted signing algorithm. Never taken from the token.
pub const ALGORITHM: Algorithm = Algorithm::RS256;

/// Verifies RS256 bearer tokens against the provider's published keys.
pub struct TokenValidator {
    issuer: String,
    audience: String,
    leeway: u64,
    keys: Arc<dyn KeySource>,
}

impl TokenValidator {
    pub fn new(config: &AuthConfig, keys: Arc<dyn KeySource>) -> Self {
        Self {
            issuer: config.issuer(),
            audience: config.api_audience.clone(),
            leeway: config.clock_skew_secs.min(MAX_CLOCK_SKEW_SECS),
            keys,
        }
    }

    /// Build a validator with the key source the config asks for: a
    /// per-request fetch when `jwks_cache_secs` is 0, a cache otherwise.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let fetcher = JwksFetcher::new(config.jwks_url(), config.jwks_timeout())?;

        let keys: Arc<dyn KeySource> = if config.jwks_cache_secs == 0 {
            Arc::new(fetcher)
        } else {
            Arc::new(JwksCache::new(
                fetcher,
                Duration::from_secs(config.jwks_cache_secs),
            ))
        };

        Ok(Self::new(config, keys))
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Extract the bearer token from `headers` and verify it.
    pub async fn authenticate(
        &self,
        headers: &HashMap<String, Vec<String>>,
    ) -> Result<ValidatedClaims, AuthError> {
        let token = extract_bearer_token(headers)?;
        self.verify(token).await
    }

    /// Verify signature and standard claims of `token`.
    pub async fn verify(&self, token: &str) -> Result<ValidatedClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode token header");
            AuthError::unparseable()
        })?;

        debug!(
            kid = ?header.kid,
            alg = ?header.alg,
            "Validating bearer token"
        );

        let kid = header.kid.as_deref().ok_or_else(|| {
            debug!("Token header has no kid");
            AuthError::no_matching_key()
        })?;

        let signing_key = self.signing_key(kid).await?;

        let decoding_key = DecodingKey::from_rsa_components(&signing_key.n, &signing_key.e)
            .map_err(|e| {
                warn!(kid = %kid, error = %e, "Published key has invalid RSA components");
                AuthError::unparseable()
            })?;

        let token_data = decode::<Map<String, Value>>(token, &decoding_key, &self.validation())
            .map_err(|e| map_jwt_error(&e))?;

        let claims = ValidatedClaims::new(token_data.claims);
        info!(sub = ?claims.subject(), "Bearer token validated");
        Ok(claims)
    }

    /// Look up `kid`, giving the key source one chance to pick up a rotated key.
    async fn signing_key(&self, kid: &str) -> Result<SigningKey, AuthError> {
        let key_set = self.keys.key_set().await.map_err(|e| {
            warn!(error = %e, "Key set unavailable");
            AuthError::no_matching_key()
        })?;

        if let Some(key) = find_key(&key_set, kid) {
            return Ok(key.clone());
        }

        match self.keys.refresh_on_miss(kid).await {
            Ok(Some(refreshed)) => find_key(&refreshed, kid).cloned().ok_or_else(|| {
                debug!(kid = %kid, "No published key matches kid");
                AuthError::no_matching_key()
            }),
            Ok(None) => {
                debug!(kid = %kid, "No published key matches kid");
                Err(AuthError::no_matching_key())
            }
            Err(e) => {
                warn!(kid = %kid, error = %e, "Key set refresh failed");
                Err(AuthError::no_matching_key())
            }
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.algorithms = vec![ALGORITHM];
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }
}

/// Map a verification failure onto the caller-facing taxonomy.
fn map_jwt_error(err: &JwtError) -> AuthError {
    let mapped = match err.kind() {
        JwtErrorKind::ExpiredSignature => AuthError::expired(),
        JwtErrorKind::InvalidAudience
        | JwtErrorKind::InvalidIssuer
        | JwtErrorKind::ImmatureSignature
        | JwtErrorKind::MissingRequiredClaim(_) => AuthError::invalid_claims(),
        _ => AuthError::unparseable(),
    };

    warn!(code = %mapped.kind, error = %err, "Bearer token rejected");
    mapped
}
