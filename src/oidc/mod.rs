//! OIDC/OAuth 2.0 bearer token authentication with JWKS support.
//!
//! Header extraction, key-set retrieval (optionally cached), RS256
//! signature verification, claim validation and scope checks.

pub mod bearer;
pub mod claims;
pub mod jwks;
pub mod validator;

pub use bearer::{extract_bearer_token, parse_bearer};
pub use claims::{has_scope, Audience, ValidatedClaims};
pub use jwks::{fetch_key_set, find_key, JwksCache, JwksFetcher, KeySet, KeySource, SigningKey};
pub use validator::TokenValidator;
