//! JWKS (JSON Web Key Set) fetching, key lookup and caching.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::KeySetError;

/// Minimum time after a fetch attempt before a `kid` miss or a failed
/// refresh may trigger another fetch.
pub const MIN_MISS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// The subset of an RSA JWK needed to rebuild its public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    pub kid: String,
    pub kty: String,
    pub key_use: String,
    /// RSA modulus (base64url)
    pub n: String,
    /// RSA exponent (base64url)
    pub e: String,
}

/// Signing keys published by the provider, in endpoint order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<SigningKey>,
}

/// JWKS response from the endpoint.
#[derive(Debug, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key as published.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID
    pub kid: Option<String>,
    /// Algorithm
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
}

impl KeySet {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self { keys }
    }

    /// Build a key set from a parsed JWKS, skipping entries that cannot
    /// verify an RS256 signature.
    pub fn from_jwks(jwks: Jwks) -> Self {
        let mut keys = Vec::with_capacity(jwks.keys.len());

        for jwk in jwks.keys {
            // Skip encryption keys
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }

            match SigningKey::try_from(jwk) {
                Ok(key) => {
                    debug!(kid = %key.kid, kty = %key.kty, "Loaded JWK");
                    keys.push(key);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse JWK, skipping");
                }
            }
        }

        Self { keys }
    }

    /// Parse a JWKS document.
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        let jwks: Jwks = serde_json::from_slice(data)?;
        Ok(Self::from_jwks(jwks))
    }

    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl TryFrom<Jwk> for SigningKey {
    type Error = String;

    fn try_from(jwk: Jwk) -> Result<Self, Self::Error> {
        if jwk.kty != "RSA" {
            return Err(format!("Unsupported key type: {}", jwk.kty));
        }
        if let Some(alg) = jwk.alg.as_deref() {
            if alg != "RS256" {
                return Err(format!("Unsupported key algorithm: {}", alg));
            }
        }

        let kid = jwk.kid.ok_or("JWK missing 'kid'")?;
        let n = jwk.n.ok_or_else(|| format!("RSA key '{}' missing 'n'", kid))?;
        let e = jwk.e.ok_or_else(|| format!("RSA key '{}' missing 'e'", kid))?;

        Ok(Self {
            kid,
            kty: jwk.kty,
            key_use: jwk.key_use.unwrap_or_else(|| "sig".to_string()),
            n,
            e,
        })
    }
}

/// Find the key whose `kid` equals `kid`.
pub fn find_key<'a>(key_set: &'a KeySet, kid: &str) -> Option<&'a SigningKey> {
    key_set.keys.iter().find(|key| key.kid == kid)
}

/// GET the JWKS endpoint and parse the body into a [`KeySet`].
pub async fn fetch_key_set(client: &reqwest::Client, jwks_url: &str) -> Result<KeySet, KeySetError> {
    debug!(url = %jwks_url, "Fetching JWKS");

    let response = client
        .get(jwks_url)
        .send()
        .await
        .map_err(|source| KeySetError::Network {
            url: jwks_url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(KeySetError::Status {
            url: jwks_url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|source| KeySetError::Network {
        url: jwks_url.to_string(),
        source,
    })?;

    let key_set = KeySet::from_json(&body).map_err(|e| KeySetError::Parse {
        url: jwks_url.to_string(),
        message: e.to_string(),
    })?;

    info!(url = %jwks_url, key_count = key_set.len(), "JWKS loaded");
    Ok(key_set)
}

/// Where the validator gets its keys from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Current key set.
    async fn key_set(&self) -> Result<Arc<KeySet>, KeySetError>;

    /// Called when `kid` is not in the set returned by [`key_set`](Self::key_set).
    /// Returns a newer set when one was fetched.
    async fn refresh_on_miss(&self, _kid: &str) -> Result<Option<Arc<KeySet>>, KeySetError> {
        Ok(None)
    }
}

/// A fixed set of keys, e.g. pinned from configuration.
#[async_trait]
impl KeySource for KeySet {
    async fn key_set(&self) -> Result<Arc<KeySet>, KeySetError> {
        Ok(Arc::new(self.clone()))
    }
}

/// Uncached key source: every call fetches the full set.
pub struct JwksFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl JwksFetcher {
    pub fn new(jwks_url: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            jwks_url,
            http_client,
        })
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub async fn fetch(&self) -> Result<KeySet, KeySetError> {
        fetch_key_set(&self.http_client, &self.jwks_url).await
    }
}

#[async_trait]
impl KeySource for JwksFetcher {
    async fn key_set(&self) -> Result<Arc<KeySet>, KeySetError> {
        Ok(Arc::new(self.fetch().await?))
    }
}

struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
    /// Last fetch attempt, successful or not.
    attempted_at: Instant,
}

/// Time-bounded key-set cache with single-flight refresh.
///
/// At most one fetch runs at a time. While it runs, callers that already
/// have a set are served the stale one; callers without one wait for it.
/// After a failed fetch the stale set is served without retrying until
/// the miss-refresh interval has passed.
pub struct JwksCache {
    fetcher: JwksFetcher,
    ttl: Duration,
    miss_refresh_interval: Duration,
    current: RwLock<Option<CachedKeySet>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl JwksCache {
    pub fn new(fetcher: JwksFetcher, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            miss_refresh_interval: MIN_MISS_REFRESH_INTERVAL,
            current: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the minimum time between a fetch attempt and a refresh
    /// triggered by a `kid` miss or by a previous failure.
    pub fn with_miss_refresh_interval(mut self, interval: Duration) -> Self {
        self.miss_refresh_interval = interval;
        self
    }

    /// Cached set and its age, if any.
    fn snapshot(&self) -> Result<Option<(Arc<KeySet>, Duration)>, KeySetError> {
        let current = self.current.read().map_err(|_| KeySetError::LockPoisoned)?;
        Ok(current
            .as_ref()
            .map(|cached| (Arc::clone(&cached.keys), cached.fetched_at.elapsed())))
    }

    /// Age of the last fetch attempt, if any set is cached.
    fn attempt_age(&self) -> Result<Option<Duration>, KeySetError> {
        let current = self.current.read().map_err(|_| KeySetError::LockPoisoned)?;
        Ok(current.as_ref().map(|cached| cached.attempted_at.elapsed()))
    }

    /// The stale set, if the last attempt failed too recently to retry.
    fn backing_off(&self) -> Result<Option<Arc<KeySet>>, KeySetError> {
        let current = self.current.read().map_err(|_| KeySetError::LockPoisoned)?;
        Ok(current
            .as_ref()
            .filter(|cached| {
                cached.attempted_at > cached.fetched_at
                    && cached.attempted_at.elapsed() < self.miss_refresh_interval
            })
            .map(|cached| Arc::clone(&cached.keys)))
    }

    fn fresh(&self) -> Result<Option<Arc<KeySet>>, KeySetError> {
        Ok(self
            .snapshot()?
            .filter(|(_, age)| *age < self.ttl)
            .map(|(keys, _)| keys))
    }

    /// Fetch and store a new set. Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<Arc<KeySet>, KeySetError> {
        match self.fetcher.fetch().await {
            Ok(key_set) => {
                let keys = Arc::new(key_set);
                {
                    let now = Instant::now();
                    let mut current = self.current.write().map_err(|_| KeySetError::LockPoisoned)?;
                    *current = Some(CachedKeySet {
                        keys: Arc::clone(&keys),
                        fetched_at: now,
                        attempted_at: now,
                    });
                }

                info!(
                    url = %self.fetcher.jwks_url(),
                    key_count = keys.len(),
                    "JWKS cache refreshed"
                );
                Ok(keys)
            }
            Err(e) => match self.mark_failed_attempt()? {
                Some((stale, age)) => {
                    warn!(
                        error = %e,
                        age_secs = age.as_secs(),
                        "JWKS refresh failed, serving stale key set"
                    );
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Record a failed fetch; returns the stale set and its age.
    fn mark_failed_attempt(&self) -> Result<Option<(Arc<KeySet>, Duration)>, KeySetError> {
        let mut current = self.current.write().map_err(|_| KeySetError::LockPoisoned)?;
        Ok(current.as_mut().map(|cached| {
            cached.attempted_at = Instant::now();
            (Arc::clone(&cached.keys), cached.fetched_at.elapsed())
        }))
    }

    /// Force refresh the cache.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeySetError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }
}

#[async_trait]
impl KeySource for JwksCache {
    async fn key_set(&self) -> Result<Arc<KeySet>, KeySetError> {
        if let Some(keys) = self.fresh()? {
            return Ok(keys);
        }
        if let Some(stale) = self.backing_off()? {
            debug!("Recent JWKS refresh failed, serving stale key set");
            return Ok(stale);
        }

        match self.refresh_lock.try_lock() {
            Ok(_guard) => {
                // Someone may have refreshed between the check and the lock
                if let Some(keys) = self.fresh()? {
                    return Ok(keys);
                }
                self.refresh_locked().await
            }
            Err(_) => {
                if let Some((stale, _)) = self.snapshot()? {
                    debug!("JWKS refresh in flight, serving stale key set");
                    return Ok(stale);
                }

                let _guard = self.refresh_lock.lock().await;
                if let Some((keys, _)) = self.snapshot()? {
                    return Ok(keys);
                }
                // The in-flight refresh failed; try once more ourselves
                self.refresh_locked().await
            }
        }
    }

    async fn refresh_on_miss(&self, kid: &str) -> Result<Option<Arc<KeySet>>, KeySetError> {
        if let Some(age) = self.attempt_age()? {
            if age < self.miss_refresh_interval {
                return Ok(None);
            }
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(age) = self.attempt_age()? {
            if age < self.miss_refresh_interval {
                // Another caller fetched while we waited
                return Ok(self.snapshot()?.map(|(keys, _)| keys));
            }
        }

        debug!(kid = %kid, "Key not found in cache, refreshing JWKS");
        self.refresh_locked().await.map(Some)
    }
}
