//! Authentication error taxonomy.
//!
//! Every rejection produced by the bearer pipeline is a single [`AuthError`]
//! carrying a machine-readable code, an HTTP status and a human-readable
//! description. Key-set fetch failures have their own type, [`KeySetError`],
//! which never reaches callers directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Description used when the `Authorization` header is absent.
pub const DESC_HEADER_MISSING: &str = "Authorization header is expected";
/// Description used when the scheme is not `Bearer`.
pub const DESC_NOT_BEARER: &str = "Authorization header must start with Bearer";
/// Description used when the header holds only the scheme.
pub const DESC_TOKEN_NOT_FOUND: &str = "Token not found";
/// Description used when the header holds more than two parts.
pub const DESC_NOT_BEARER_TOKEN: &str = "Authorization header must be Bearer token";
/// Description used when no published key matches the token's `kid`.
pub const DESC_NO_MATCHING_KEY: &str = "Unable to find appropriate key";
/// Description used for any other decode or signature failure.
pub const DESC_UNPARSEABLE: &str = "Unable to parse authentication token.";
/// Description used for expired tokens.
pub const DESC_EXPIRED: &str = "token is expired";
/// Description used for audience/issuer mismatches.
pub const DESC_BAD_CLAIMS: &str = "incorrect claims, please check the audience and issuer";

/// Machine-readable error code, serialized as the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthorizationHeaderMissing,
    InvalidHeader,
    TokenExpired,
    InvalidClaims,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthorizationHeaderMissing => "authorization_header_missing",
            ErrorKind::InvalidHeader => "invalid_header",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::InvalidClaims => "invalid_claims",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sole error surfaced by bearer authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {description}")]
pub struct AuthError {
    pub kind: ErrorKind,
    pub http_status: u16,
    pub description: String,
}

/// Wire form of an [`AuthError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorBody {
    pub code: ErrorKind,
    pub description: String,
}

impl AuthError {
    /// Every kind in this taxonomy maps to 401.
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: 401,
            description: description.into(),
        }
    }

    pub fn header_missing() -> Self {
        Self::new(ErrorKind::AuthorizationHeaderMissing, DESC_HEADER_MISSING)
    }

    pub fn invalid_header(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidHeader, description)
    }

    pub fn no_matching_key() -> Self {
        Self::invalid_header(DESC_NO_MATCHING_KEY)
    }

    pub fn unparseable() -> Self {
        Self::invalid_header(DESC_UNPARSEABLE)
    }

    pub fn expired() -> Self {
        Self::new(ErrorKind::TokenExpired, DESC_EXPIRED)
    }

    pub fn invalid_claims() -> Self {
        Self::new(ErrorKind::InvalidClaims, DESC_BAD_CLAIMS)
    }

    pub fn body(&self) -> AuthErrorBody {
        AuthErrorBody {
            code: self.kind,
            description: self.description.clone(),
        }
    }

    /// Render as `{"code": ..., "description": ...}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.body())
    }
}

/// Failure to obtain a key set from the provider.
///
/// Not part of the caller-facing taxonomy; the validator logs it and
/// answers with `invalid_header`.
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("failed to fetch JWKS from {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("JWKS endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse JWKS from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("JWKS cache lock poisoned")]
    LockPoisoned,
}
