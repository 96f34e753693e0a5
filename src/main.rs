//! Bearer token checker
//!
//! Runs one `Authorization` header value through the token gate and
//! prints the rendered response.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use oidc_bearer_auth::{
    AuthConfig, Protected, Request, Response, TokenGuard, TokenValidator,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "oidc-bearer-auth")]
#[command(about = "Verify a bearer token against an OIDC provider's published keys")]
struct Args {
    /// Authorization header value, e.g. "Bearer eyJ..."
    #[arg(long, env = "AUTHORIZATION")]
    authorization: Option<String>,

    /// Reject tokens without this scope (403)
    #[arg(long)]
    require_scope: Option<String>,

    /// JSON configuration file, applied before flags
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Provider domain (issuer host)
    #[arg(long, env = "PROVIDER_DOMAIN")]
    provider_domain: Option<String>,

    /// Expected audience
    #[arg(long, env = "API_AUDIENCE")]
    api_audience: Option<String>,

    /// OAuth client ID
    #[arg(long, env = "CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Key-set cache lifetime in seconds (0 = fetch on every validation)
    #[arg(long, env = "JWKS_CACHE_SECS")]
    jwks_cache_secs: Option<u64>,

    /// Timeout for the JWKS fetch in seconds
    #[arg(long, env = "JWKS_TIMEOUT_SECS")]
    jwks_timeout_secs: Option<u64>,

    /// Leeway for exp/nbf in seconds
    #[arg(long, env = "CLOCK_SKEW_SECS")]
    clock_skew_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Layer configuration: defaults, then the config file, then flags.
fn load_config(args: &Args) -> Result<AuthConfig> {
    let mut config = match &args.config {
        Some(path) => AuthConfig::from_file(path)?,
        None => AuthConfig::default(),
    };

    if let Some(ref domain) = args.provider_domain {
        config.provider_domain = domain.clone();
    }
    if let Some(ref audience) = args.api_audience {
        config.api_audience = audience.clone();
    }
    if let Some(ref id) = args.client_id {
        config.client_id = Some(id.clone());
    }
    if let Some(ref secret) = args.client_secret {
        config.client_secret = Some(secret.clone());
    }
    if let Some(secs) = args.jwks_cache_secs {
        config.jwks_cache_secs = secs;
    }
    if let Some(secs) = args.jwks_timeout_secs {
        config.jwks_timeout_secs = secs;
    }
    if let Some(skew) = args.clock_skew_secs {
        config.clock_skew_secs = skew;
    }

    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    Ok(config)
}

fn echo_claims(request: &Request) -> Response {
    Response::ok(json!({ "claims": request.claims() }))
}

async fn check(config: &AuthConfig, args: &Args) -> Result<Response> {
    let validator = Arc::new(TokenValidator::from_config(config)?);

    let mut guard = TokenGuard::new(validator);
    if let Some(ref scope) = args.require_scope {
        guard = guard.with_required_scope(scope.clone());
    }
    let protected = Protected::new(guard, echo_claims);

    let mut request = Request::new("GET", "/");
    if let Some(ref value) = args.authorization {
        request = request.with_header("Authorization", value.clone());
    }

    Ok(protected.handle(request).await)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = load_config(&args)?;

    info!(
        issuer = %config.issuer(),
        audience = %config.api_audience,
        jwks_cache_secs = config.jwks_cache_secs,
        "Configuration loaded"
    );

    let response = check(&config, &args).await?;
    debug!(status = response.status, "Check completed");

    let output = json!({
        "status": response.status,
        "headers": response
            .headers
            .iter()
            .map(|(k, v)| json!({ "name": k, "value": v }))
            .collect::<Vec<_>>(),
        "body": response.body,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ENV_VARS: &[&str] = &[
        "AUTHORIZATION",
        "PROVIDER_DOMAIN",
        "API_AUDIENCE",
        "CLIENT_ID",
        "CLIENT_SECRET",
        "JWKS_CACHE_SECS",
        "JWKS_TIMEOUT_SECS",
        "CLOCK_SKEW_SECS",
    ];

    /// Parse flags only; the shell environment must not leak in.
    fn args(extra: &[&str]) -> Args {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        let mut argv = vec!["oidc-bearer-auth"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_build_config() {
        let args = args(&[
            "--provider-domain",
            "tenant.auth0.com",
            "--api-audience",
            "https://api.example.com",
            "--jwks-cache-secs",
            "600",
        ]);
        let config = load_config(&args).unwrap();

        assert_eq!(config.issuer(), "https://tenant.auth0.com/");
        assert_eq!(config.api_audience, "https://api.example.com");
        assert_eq!(config.jwks_cache_secs, 600);
        assert_eq!(config.clock_skew_secs, 0);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"provider-domain": "file.auth0.com", "api-audience": "https://file.example.com", "clock-skew-secs": 5}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = args(&["--config", &path, "--api-audience", "https://flag.example.com"]);
        let config = load_config(&args).unwrap();

        assert_eq!(config.provider_domain, "file.auth0.com");
        assert_eq!(config.api_audience, "https://flag.example.com");
        assert_eq!(config.clock_skew_secs, 5);
    }

    #[test]
    fn test_missing_audience_rejected() {
        let args = args(&["--provider-domain", "tenant.auth0.com", "--api-audience", ""]);
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("api_audience"));
    }

    #[tokio::test]
    async fn test_check_without_header() {
        let args = args(&[
            "--provider-domain",
            "tenant.auth0.com",
            "--api-audience",
            "https://api.example.com",
        ]);
        let config = load_config(&args).unwrap();
        let response = check(&config, &args).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body["code"], "authorization_header_missing");
    }
}
