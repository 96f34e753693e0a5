//! Shared test fixtures: fixed RSA key pairs, the matching JWKS document,
//! and helpers to mint tokens against them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// JWKS publishing `test-key-1` and `test-key-2`.
pub const JWKS_JSON: &str = include_str!("../testdata/jwks.json");

/// Private half of `test-key-1`.
pub const PRIVATE_KEY_PEM: &str = include_str!("../testdata/rsa_private.pem");

/// Private half of `test-key-2`.
pub const OTHER_PRIVATE_KEY_PEM: &str = include_str!("../testdata/rsa_other_private.pem");

pub const TEST_KID: &str = "test-key-1";
pub const TEST_AUDIENCE: &str = "https://api.example.com";

/// Standard claims valid for one hour.
pub fn valid_claims(issuer: &str, audience: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": issuer,
        "sub": "auth0|user-123",
        "aud": audience,
        "iat": now,
        "exp": now + 3600,
        "scope": "openid profile read:messages",
    })
}

/// Sign `claims` with RS256 using `pem`, tagging the header with `kid`.
pub fn sign_token(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);

    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test key should parse");
    jsonwebtoken::encode(&header, claims, &key).expect("Failed to encode test JWT")
}

/// A token for `claims` signed by `test-key-1`.
pub fn signed_token(claims: &Value) -> String {
    sign_token(PRIVATE_KEY_PEM, Some(TEST_KID), claims)
}

/// Build `{header}.{payload}.` with an empty signature.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}
