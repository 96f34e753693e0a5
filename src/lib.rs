//! Bearer-token authentication against an OAuth2/OIDC provider.
//!
//! The core is [`oidc::TokenValidator`]: it extracts the bearer token from
//! an `Authorization` header, selects the provider's signing key by `kid`,
//! verifies the RS256 signature and checks `aud`, `iss` and `exp`. Every
//! rejection is a single [`AuthError`]. [`gate`] wraps request handlers
//! with token or session checks.

pub mod config;
pub mod error;
pub mod gate;
pub mod oidc;
pub mod session;

#[cfg(test)]
mod testutil;

pub use config::{AuthConfig, AuthConfigJson};
pub use error::{AuthError, ErrorKind, KeySetError};
pub use gate::{
    Guard, Handler, Protected, Rejection, Request, Response, SessionGuard, TokenGuard,
};
pub use oidc::{has_scope, TokenValidator, ValidatedClaims};
