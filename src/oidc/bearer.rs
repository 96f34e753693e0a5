//! `Authorization: Bearer <token>` header parsing.

use std::collections::HashMap;

use crate::error::{AuthError, DESC_NOT_BEARER, DESC_NOT_BEARER_TOKEN, DESC_TOKEN_NOT_FOUND};

/// Header name, compared case-insensitively.
pub const AUTHORIZATION: &str = "authorization";

/// First value of the `Authorization` header, if present.
pub fn authorization_header(headers: &HashMap<String, Vec<String>>) -> Option<&str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION))
        .and_then(|(_, v)| v.first())
        .map(|s| s.as_str())
}

/// Extract the bearer token from request headers.
pub fn extract_bearer_token(headers: &HashMap<String, Vec<String>>) -> Result<&str, AuthError> {
    match authorization_header(headers) {
        Some(value) => parse_bearer(value),
        None => Err(AuthError::header_missing()),
    }
}

/// Parse an `Authorization` header value.
///
/// The scheme is checked before the part count, so `"Basic"` alone reports
/// the scheme while `"Bearer"` alone reports the missing token.
pub fn parse_bearer(value: &str) -> Result<&str, AuthError> {
    let parts: Vec<&str> = value.split_whitespace().collect();

    // Empty or blank values count as no header at all
    let Some(scheme) = parts.first() else {
        return Err(AuthError::header_missing());
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::invalid_header(DESC_NOT_BEARER));
    }

    match parts.len() {
        1 => Err(AuthError::invalid_header(DESC_TOKEN_NOT_FOUND)),
        2 => Ok(parts[1]),
        _ => Err(AuthError::invalid_header(DESC_NOT_BEARER_TOKEN)),
    }
}
