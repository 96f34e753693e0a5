//! Authentication gates wrapped around request handlers.
//!
//! A [`Guard`] inspects a [`Request`] and either lets it through (possibly
//! attaching the authenticated session or claims to it) or rejects it.
//! [`Protected`] composes a guard with a [`Handler`] and short-circuits
//! on rejection. All per-request state lives on the `Request`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::oidc::{TokenValidator, ValidatedClaims};
use crate::session::{Session, SessionId, SessionStore};

/// Default name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

/// An inbound request and its request-scoped authentication context.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    headers: HashMap<String, Vec<String>>,
    session: Option<Session>,
    claims: Option<ValidatedClaims>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Attach a session resolved by the surrounding framework.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(|s| s.as_str())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Claims of the bearer token, set by [`TokenGuard`].
    pub fn claims(&self) -> Option<&ValidatedClaims> {
        self.claims.as_ref()
    }
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl Response {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<AuthError> for Response {
    fn from(err: AuthError) -> Self {
        Response::json(err.http_status, err.to_json())
            .add_header("WWW-Authenticate", format!("Bearer error=\"{}\"", err.kind))
    }
}

/// Why a guard refused a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// No authenticated session. Rendered out-of-band from [`AuthError`].
    Session,
    /// Bearer authentication failed.
    Token(AuthError),
    /// Token is valid but lacks a required scope.
    Forbidden { scope: String },
}

impl Rejection {
    pub fn into_response(self) -> Response {
        match self {
            Rejection::Session => Response::ok(json!({
                "success": false,
                "error": "Authentication failure",
            })),
            Rejection::Token(err) => err.into(),
            Rejection::Forbidden { scope } => Response::json(
                403,
                json!({
                    "code": "insufficient_scope",
                    "description": format!("Scope '{}' is required", scope),
                }),
            )
            .add_header(
                "WWW-Authenticate",
                format!("Bearer error=\"insufficient_scope\", scope=\"{}\"", scope),
            ),
        }
    }
}

/// Request handler behind a gate.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: &Request) -> Response;
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    async fn call(&self, request: &Request) -> Response {
        self(request)
    }
}

/// Authentication check run before a handler.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, request: &mut Request) -> Result<(), Rejection>;
}

/// Requires a logged-in session.
///
/// Accepts a session already attached to the request, otherwise resolves
/// one from the session cookie.
pub struct SessionGuard {
    store: Arc<SessionStore>,
    cookie_name: String,
}

impl SessionGuard {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            cookie_name: SESSION_COOKIE.to_string(),
        }
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Parse session ID from cookie header.
    fn parse_session_cookie(&self, cookie_header: &str) -> Option<SessionId> {
        let prefix = format!("{}=", self.cookie_name);
        cookie_header
            .split(';')
            .find_map(|part| part.trim().strip_prefix(&prefix))
            .and_then(SessionId::from_hex)
    }

    fn resolve(&self, request: &Request) -> Option<Session> {
        let id = request
            .header("cookie")
            .and_then(|cookie| self.parse_session_cookie(cookie))?;

        match self.store.get(id) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl Guard for SessionGuard {
    async fn check(&self, request: &mut Request) -> Result<(), Rejection> {
        if request.session.as_ref().is_some_and(Session::is_authenticated) {
            return Ok(());
        }

        match self.resolve(request) {
            Some(session) if session.is_authenticated() => {
                request.session = Some(session);
                Ok(())
            }
            _ => {
                debug!(path = %request.path, "No authenticated session");
                Err(Rejection::Session)
            }
        }
    }
}

/// Requires a valid bearer token, and optionally a scope.
pub struct TokenGuard {
    validator: Arc<TokenValidator>,
    required_scope: Option<String>,
}

impl TokenGuard {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self {
            validator,
            required_scope: None,
        }
    }

    /// Also reject (403) tokens without `scope`.
    pub fn with_required_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = Some(scope.into());
        self
    }
}

#[async_trait]
impl Guard for TokenGuard {
    async fn check(&self, request: &mut Request) -> Result<(), Rejection> {
        let claims = self
            .validator
            .authenticate(&request.headers)
            .await
            .map_err(Rejection::Token)?;

        if let Some(ref scope) = self.required_scope {
            if !claims.has_scope(scope) {
                warn!(
                    sub = ?claims.subject(),
                    scope = %scope,
                    path = %request.path,
                    "Required scope missing"
                );
                return Err(Rejection::Forbidden {
                    scope: scope.clone(),
                });
            }
        }

        request.claims = Some(claims);
        Ok(())
    }
}

/// A handler behind a guard.
pub struct Protected<G, H> {
    guard: G,
    handler: H,
}

impl<G: Guard, H: Handler> Protected<G, H> {
    pub fn new(guard: G, handler: H) -> Self {
        Self { guard, handler }
    }

    pub async fn handle(&self, mut request: Request) -> Response {
        if let Err(rejection) = self.guard.check(&mut request).await {
            return rejection.into_response();
        }
        self.handler.call(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::oidc::KeySet;
    use crate::session::Profile;
    use crate::testutil::{craft_raw_jwt, signed_token, valid_claims, JWKS_JSON, TEST_AUDIENCE};

    const ISSUER: &str = "https://tenant.auth0.com/";

    fn validator() -> Arc<TokenValidator> {
        let config = AuthConfig {
            provider_domain: "tenant.auth0.com".to_string(),
            api_audience: TEST_AUDIENCE.to_string(),
            ..AuthConfig::default()
        };
        let keys = KeySet::from_json(JWKS_JSON.as_bytes()).unwrap();
        Arc::new(TokenValidator::new(&config, Arc::new(keys)))
    }

    fn echo_subject(request: &Request) -> Response {
        Response::ok(json!({
            "sub": request.claims().and_then(|c| c.subject()),
        }))
    }

    fn whoami(request: &Request) -> Response {
        let name = request
            .session()
            .and_then(|s| s.profile.as_ref())
            .map(|p| p.name.clone());
        Response::ok(json!({ "name": name }))
    }

    fn profile() -> Profile {
        Profile {
            user_id: "auth0|123".to_string(),
            name: "Ada".to_string(),
            picture: None,
        }
    }

    #[tokio::test]
    async fn test_token_gate_passes_claims_to_handler() {
        let protected = Protected::new(TokenGuard::new(validator()), echo_subject);
        let token = signed_token(&valid_claims(ISSUER, TEST_AUDIENCE));
        let request =
            Request::new("GET", "/api/private").with_header("Authorization", format!("Bearer {}", token));

        let response = protected.handle(request).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"sub": "auth0|user-123"}));
    }

    #[tokio::test]
    async fn test_token_gate_missing_header() {
        let protected = Protected::new(TokenGuard::new(validator()), echo_subject);
        let response = protected.handle(Request::new("GET", "/api/private")).await;

        assert_eq!(response.status, 401);
        assert_eq!(response.body["code"], "authorization_header_missing");
        assert!(response.header("www-authenticate").is_some());
    }

    #[tokio::test]
    async fn test_token_gate_basic_scheme() {
        let protected = Protected::new(TokenGuard::new(validator()), echo_subject);
        let request = Request::new("GET", "/api/private").with_header("Authorization", "Basic xyz");

        let response = protected.handle(request).await;
        assert_eq!(response.status, 401);
        assert_eq!(response.body["code"], "invalid_header");
        assert_eq!(
            response.body["description"],
            "Authorization header must start with Bearer"
        );
    }

    #[tokio::test]
    async fn test_token_gate_unknown_kid() {
        let protected = Protected::new(TokenGuard::new(validator()), echo_subject);
        let token = craft_raw_jwt(&json!({"alg": "RS256", "kid": "X"}), &json!({}));
        let request =
            Request::new("GET", "/api/private").with_header("Authorization", format!("Bearer {}", token));

        let response = protected.handle(request).await;
        assert_eq!(response.status, 401);
        assert_eq!(
            response.body,
            json!({"code": "invalid_header", "description": "Unable to find appropriate key"})
        );
    }

    #[tokio::test]
    async fn test_token_gate_required_scope() {
        let guard = TokenGuard::new(validator()).with_required_scope("read:messages");
        let protected = Protected::new(guard, echo_subject);
        let token = signed_token(&valid_claims(ISSUER, TEST_AUDIENCE));
        let request =
            Request::new("GET", "/api/messages").with_header("Authorization", format!("Bearer {}", token));
        assert_eq!(protected.handle(request).await.status, 200);

        let guard = TokenGuard::new(validator()).with_required_scope("write:messages");
        let protected = Protected::new(guard, echo_subject);
        let request =
            Request::new("POST", "/api/messages").with_header("Authorization", format!("Bearer {}", token));
        let response = protected.handle(request).await;
        assert_eq!(response.status, 403);
        assert_eq!(response.body["code"], "insufficient_scope");
    }

    #[tokio::test]
    async fn test_handler_decides_on_scope() {
        let handler = |request: &Request| {
            let allowed = request
                .claims()
                .is_some_and(|c| c.has_scope("admin"));
            if allowed {
                Response::ok(json!({"message": "welcome"}))
            } else {
                Response::json(403, json!({"message": "admin scope required"}))
            }
        };
        let protected = Protected::new(TokenGuard::new(validator()), handler);
        let token = signed_token(&valid_claims(ISSUER, TEST_AUDIENCE));
        let request =
            Request::new("GET", "/api/admin").with_header("Authorization", format!("Bearer {}", token));

        assert_eq!(protected.handle(request).await.status, 403);
    }

    #[tokio::test]
    async fn test_session_gate_rejects_without_session() {
        let store = Arc::new(SessionStore::new(3600));
        let protected = Protected::new(SessionGuard::new(store), whoami);

        let response = protected.handle(Request::new("GET", "/api/users")).await;
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            json!({"success": false, "error": "Authentication failure"})
        );
    }

    #[tokio::test]
    async fn test_session_gate_resolves_cookie() {
        let store = Arc::new(SessionStore::new(3600));
        let id = store.login(profile()).unwrap();
        let protected = Protected::new(SessionGuard::new(Arc::clone(&store)), whoami);

        let request = Request::new("GET", "/api/users")
            .with_header("Cookie", format!("theme=dark; session={}", id.to_hex()));
        let response = protected.handle(request).await;
        assert_eq!(response.body, json!({"name": "Ada"}));

        // Logged out
        store.delete(id).unwrap();
        let request =
            Request::new("GET", "/api/users").with_header("Cookie", format!("session={}", id.to_hex()));
        let response = protected.handle(request).await;
        assert_eq!(response.body["success"], false);
    }

    #[tokio::test]
    async fn test_session_gate_custom_cookie_and_attached_session() {
        let store = Arc::new(SessionStore::new(3600));
        let guard = SessionGuard::new(Arc::clone(&store)).with_cookie_name("sid");
        let protected = Protected::new(guard, whoami);

        let request =
            Request::new("GET", "/api/users").with_session(Session::with_profile(profile(), 60));
        assert_eq!(protected.handle(request).await.body, json!({"name": "Ada"}));

        // Anonymous sessions are not authenticated
        let request = Request::new("GET", "/api/users").with_session(Session::new(60));
        assert_eq!(protected.handle(request).await.body["success"], false);

        let request = Request::new("GET", "/api/users").with_header("Cookie", "sid=not-hex");
        assert_eq!(protected.handle(request).await.body["success"], false);
    }

    #[test]
    fn test_request_header_lookup() {
        let request = Request::new("GET", "/")
            .with_header("X-Test", "one")
            .with_header("X-Test", "two");
        assert_eq!(request.header("x-test"), Some("one"));
        assert_eq!(request.headers()["X-Test"].len(), 2);
        assert!(request.header("missing").is_none());
    }
}
