//! Provider and validation configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Identity provider and API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Issuer host. A bare host gets an `https://` scheme.
    /// Example: "tenant.auth0.com"
    #[serde(default)]
    pub provider_domain: String,

    /// Expected audience (aud claim).
    #[serde(default)]
    pub api_audience: String,

    /// OAuth client ID. Only the login redirect flow uses it.
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret. Only the login redirect flow uses it.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,

    /// Key-set cache lifetime in seconds. 0 fetches the key set on every
    /// validation.
    #[serde(default)]
    pub jwks_cache_secs: u64,

    /// Timeout for the JWKS HTTP fetch.
    #[serde(default = "default_jwks_timeout")]
    pub jwks_timeout_secs: u64,

    /// Leeway in seconds for exp/nbf validation.
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Lifetime of login sessions.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

/// Upper bound for `clock_skew_secs`.
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

fn default_jwks_timeout() -> u64 {
    10
}

fn default_session_ttl() -> u64 {
    86400 // 24 hours
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider_domain: String::new(),
            api_audience: String::new(),
            client_id: None,
            client_secret: None,
            jwks_cache_secs: 0,
            jwks_timeout_secs: default_jwks_timeout(),
            clock_skew_secs: 0,
            session_ttl_secs: default_session_ttl(),
        }
    }
}

impl AuthConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_domain.trim().is_empty() {
            return Err("provider_domain is required".to_string());
        }

        if self.provider_domain.chars().any(char::is_whitespace) {
            return Err("provider_domain must not contain whitespace".to_string());
        }

        if self.api_audience.is_empty() {
            return Err("api_audience is required".to_string());
        }

        if self.jwks_timeout_secs == 0 {
            return Err("jwks_timeout_secs must be greater than zero".to_string());
        }

        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(format!(
                "clock_skew_secs must be at most {}",
                MAX_CLOCK_SKEW_SECS
            ));
        }

        Ok(())
    }

    /// Provider base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let domain = self.provider_domain.trim().trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    /// Expected `iss` claim: the provider URL with a trailing `/`.
    pub fn issuer(&self) -> String {
        format!("{}/", self.base_url())
    }

    /// Well-known JWKS endpoint of the provider.
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.base_url())
    }

    pub fn jwks_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_timeout_secs)
    }

    /// Load a full configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let json: AuthConfigJson = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        let mut config = Self::default();
        json.apply_to(&mut config);
        Ok(config)
    }
}

/// JSON overlay applied on top of an existing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AuthConfigJson {
    pub provider_domain: Option<String>,
    pub api_audience: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub jwks_cache_secs: Option<u64>,
    pub jwks_timeout_secs: Option<u64>,
    pub clock_skew_secs: Option<u64>,
    pub session_ttl_secs: Option<u64>,
}

impl AuthConfigJson {
    /// Apply JSON config to existing config.
    pub fn apply_to(&self, config: &mut AuthConfig) {
        if let Some(ref domain) = self.provider_domain {
            config.provider_domain = domain.clone();
        }
        if let Some(ref audience) = self.api_audience {
            config.api_audience = audience.clone();
        }
        if let Some(ref id) = self.client_id {
            config.client_id = Some(id.clone());
        }
        if let Some(ref secret) = self.client_secret {
            config.client_secret = Some(secret.clone());
        }
        if let Some(secs) = self.jwks_cache_secs {
            config.jwks_cache_secs = secs;
        }
        if let Some(secs) = self.jwks_timeout_secs {
            config.jwks_timeout_secs = secs;
        }
        if let Some(skew) = self.clock_skew_secs {
            config.clock_skew_secs = skew;
        }
        if let Some(ttl) = self.session_ttl_secs {
            config.session_ttl_secs = ttl;
        }
    }
}
