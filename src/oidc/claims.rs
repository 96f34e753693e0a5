//! Validated token claims and scope checks.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }
}

/// Claims of a token whose signature and standard claims were verified.
///
/// Holds the payload exactly as signed. Produced once per request by
/// [`TokenValidator::verify`](super::TokenValidator::verify).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedClaims(Map<String, Value>);

impl ValidatedClaims {
    pub(crate) fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    pub fn audience(&self) -> Audience {
        self.0
            .get("aud")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// `exp` as seconds since the epoch.
    pub fn expiry(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    /// Raw space-separated `scope` claim.
    pub fn scope(&self) -> Option<&str> {
        self.get_str("scope")
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.scope()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// True iff `required` is one of the whitespace-separated scopes.
    pub fn has_scope(&self, required: &str) -> bool {
        scope_contains(self.get("scope"), required)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

fn scope_contains(scope: Option<&Value>, required: &str) -> bool {
    match scope {
        Some(Value::String(s)) => s.split_whitespace().any(|scope| scope == required),
        _ => false,
    }
}

/// Decode the payload segment without checking the signature.
fn decode_unverified_claims(token: &str) -> Option<Map<String, Value>> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Check a scope against a raw token's claims.
///
/// The signature is NOT verified. Only use this on a token that already
/// went through [`TokenValidator::verify`](super::TokenValidator::verify)
/// for the same request; otherwise prefer [`ValidatedClaims::has_scope`].
/// Never fails: malformed tokens and missing claims yield `false`.
pub fn has_scope(token: &str, required: &str) -> bool {
    decode_unverified_claims(token)
        .map(|claims| scope_contains(claims.get("scope"), required))
        .unwrap_or(false)
}
