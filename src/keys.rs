//! Key material for both token families.
//!
//! Access tokens are RS256. The private half lives in [`SigningKey`] and never
//! leaves the issuer; verifiers resolve public keys by `kid` through
//! [`VerificationKeys`], which caches a JWK Set fetched from a
//! [`KeySetSource`]. Refresh tokens are HS256 with a [`RefreshSecret`].

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// The only algorithm accepted for access tokens.
pub const ACCESS_TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

/// The only algorithm accepted for refresh tokens.
pub const REFRESH_TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// How long a fetched keyset is trusted before it is refetched.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Minimum spacing between keyset fetches triggered by cache misses.
pub const DEFAULT_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for remote keyset requests.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
    #[error("Failed to fetch keyset: {0}")]
    Fetch(String),
    #[error("No verification key available for kid '{0}'")]
    Unavailable(String),
    #[error("Unknown key id '{0}'")]
    UnknownKid(String),
}

impl From<openssl::error::ErrorStack> for KeyError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::InvalidKey(e.to_string())
    }
}

// =============================================================================
// RSA public parameters
// =============================================================================

/// Base64url-encoded RSA modulus and exponent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RsaPublicParts {
    n: String,
    e: String,
}

impl RsaPublicParts {
    fn from_rsa<T: openssl::pkey::HasPublic>(rsa: &Rsa<T>) -> Self {
        Self {
            n: URL_SAFE_NO_PAD.encode(rsa.n().to_vec()),
            e: URL_SAFE_NO_PAD.encode(rsa.e().to_vec()),
        }
    }

    /// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) or PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) PEM.
    fn from_public_pem(pem: &[u8]) -> Result<Self, KeyError> {
        let rsa = Rsa::public_key_from_pem(pem).or_else(|_| Rsa::public_key_from_pem_pkcs1(pem))?;
        Ok(Self::from_rsa(&rsa))
    }

    /// RFC 7638 JWK thumbprint, used as the key id.
    fn thumbprint(&self) -> String {
        let canonical = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, self.e, self.n);
        URL_SAFE_NO_PAD.encode(openssl::sha::sha256(canonical.as_bytes()))
    }

    fn to_jwk(&self, kid: &str) -> Result<Jwk, KeyError> {
        serde_json::from_value(serde_json::json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": self.n,
            "e": self.e,
        }))
        .map_err(|e| KeyError::InvalidKey(e.to_string()))
    }
}

// =============================================================================
// Issuer-side keys
// =============================================================================

/// RSA private key used to sign access tokens.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    public: RsaPublicParts,
}

impl SigningKey {
    /// Load from a PEM private key (PKCS#1 or PKCS#8).
    pub fn from_pem(pem: &[u8]) -> Result<Self, KeyError> {
        let rsa = PKey::private_key_from_pem(pem)?.rsa()?;
        if rsa.size() < 256 {
            return Err(KeyError::InvalidKey(
                "RSA key must be at least 2048 bits".into(),
            ));
        }
        let encoding_key = EncodingKey::from_rsa_der(&rsa.private_key_to_der()?);
        let public = RsaPublicParts::from_rsa(&rsa);
        Ok(Self {
            kid: public.thumbprint(),
            encoding_key,
            public,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Public half as a JWK.
    pub fn public_jwk(&self) -> Result<Jwk, KeyError> {
        self.public.to_jwk(&self.kid)
    }
}

/// Shared secret for refresh tokens.
#[derive(Clone)]
pub struct RefreshSecret {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl RefreshSecret {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Build the keyset this service publishes: the current signing key first,
/// followed by recently rotated public keys that may still verify
/// outstanding tokens.
pub fn published_key_set(
    current: Option<&SigningKey>,
    previous_public_pems: &[Vec<u8>],
) -> Result<JwkSet, KeyError> {
    let mut keys = Vec::with_capacity(previous_public_pems.len() + 1);
    if let Some(current) = current {
        keys.push(current.public_jwk()?);
    }
    for pem in previous_public_pems {
        let public = RsaPublicParts::from_public_pem(pem)?;
        let kid = public.thumbprint();
        if current.is_some_and(|c| c.kid() == kid) {
            continue;
        }
        keys.push(public.to_jwk(&kid)?);
    }
    Ok(JwkSet { keys })
}

// =============================================================================
// Keyset sources
// =============================================================================

/// Where verifiers obtain public keys from.
pub trait KeySetSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<JwkSet, KeyError>>;
}

/// An in-process keyset, used when the verifier runs next to the issuer.
pub struct StaticKeySetSource {
    keys: JwkSet,
}

impl StaticKeySetSource {
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }
}

impl KeySetSource for StaticKeySetSource {
    fn fetch(&self) -> BoxFuture<'_, Result<JwkSet, KeyError>> {
        Box::pin(async move { Ok(self.keys.clone()) })
    }
}

/// A remote JWKS endpoint.
pub struct HttpKeySetSource {
    client: reqwest::Client,
    uri: Url,
}

impl HttpKeySetSource {
    pub fn new(uri: Url) -> Result<Self, KeyError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| KeyError::Fetch(e.to_string()))?;
        Ok(Self { client, uri })
    }
}

impl KeySetSource for HttpKeySetSource {
    fn fetch(&self) -> BoxFuture<'_, Result<JwkSet, KeyError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.uri.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| KeyError::Fetch(e.to_string()))?;
            response
                .json::<JwkSet>()
                .await
                .map_err(|e| KeyError::Fetch(e.to_string()))
        })
    }
}

// =============================================================================
// Verifier-side cache
// =============================================================================

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, Arc<DecodingKey>>,
    fetched_at: Option<Instant>,
    last_fetch_failed: bool,
}

impl KeyCache {
    fn get(&self, kid: &str, ttl: Option<Duration>) -> Option<Arc<DecodingKey>> {
        if let Some(ttl) = ttl {
            let fresh = self.fetched_at.is_some_and(|at| at.elapsed() < ttl);
            if !fresh {
                return None;
            }
        }
        self.keys.get(kid).cloned()
    }
}

/// Cached, rate-limited resolution of access-token verification keys.
pub struct VerificationKeys {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    cache: RwLock<KeyCache>,
    fetch_lock: tokio::sync::Mutex<()>,
    // One limiter for all kids: the kid comes from an unauthenticated header.
    limiter: DefaultDirectRateLimiter,
}

impl VerificationKeys {
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self::with_timing(source, DEFAULT_KEY_CACHE_TTL, DEFAULT_REFETCH_INTERVAL)
    }

    pub fn with_timing(
        source: Arc<dyn KeySetSource>,
        ttl: Duration,
        refetch_interval: Duration,
    ) -> Self {
        let quota = Quota::with_period(refetch_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            source,
            ttl,
            cache: RwLock::new(KeyCache::default()),
            fetch_lock: tokio::sync::Mutex::new(()),
            limiter: RateLimiter::direct(quota),
        }
    }

    fn cached(&self, kid: &str, ttl: Option<Duration>) -> Option<Arc<DecodingKey>> {
        match self.cache.read() {
            Ok(cache) => cache.get(kid, ttl),
            Err(poisoned) => poisoned.into_inner().get(kid, ttl),
        }
    }

    fn replace(&self, set: &JwkSet) {
        let mut keys = HashMap::with_capacity(set.keys.len());
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };
            if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
                debug!(kid = %kid, "Skipping non-RSA JWK");
                continue;
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, Arc::new(key));
                }
                Err(e) => warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }

        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        cache.last_fetch_failed = false;
    }

    fn mark_fetch_failed(&self) {
        match self.cache.write() {
            Ok(mut cache) => cache.last_fetch_failed = true,
            Err(poisoned) => poisoned.into_inner().last_fetch_failed = true,
        }
    }

    fn last_fetch_failed(&self) -> bool {
        match self.cache.read() {
            Ok(cache) => cache.last_fetch_failed,
            Err(poisoned) => poisoned.into_inner().last_fetch_failed,
        }
    }

    /// Resolve the decoding key for `kid`.
    ///
    /// A fresh cache hit returns immediately. Otherwise at most one fetch runs
    /// at a time, and at most one fetch starts per refetch interval, however
    /// many distinct `kid`s miss. A stale cached key is still served when fetching fails or is
    /// rate limited.
    ///
    /// Fails with [`KeyError::Unavailable`] when the keyset could not be
    /// fetched and nothing cached matches, and with [`KeyError::UnknownKid`]
    /// when the keyset is reachable but does not contain `kid`.
    pub async fn decoding_key(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        if let Some(key) = self.cached(kid, Some(self.ttl)) {
            return Ok(key);
        }

        let _guard = self.fetch_lock.lock().await;

        // Another request may have refreshed the cache while we waited.
        if let Some(key) = self.cached(kid, Some(self.ttl)) {
            return Ok(key);
        }

        if self.limiter.check().is_ok() {
            match self.source.fetch().await {
                Ok(set) => {
                    debug!(keys = set.keys.len(), "Fetched verification keyset");
                    self.replace(&set);
                }
                Err(e) => {
                    warn!(kid = %kid, error = %e, "Failed to fetch verification keyset");
                    self.mark_fetch_failed();
                }
            }
        } else {
            debug!(kid = %kid, "Keyset refetch suppressed by rate limiter");
        }

        if let Some(key) = self.cached(kid, None) {
            return Ok(key);
        }
        if self.last_fetch_failed() {
            Err(KeyError::Unavailable(kid.to_string()))
        } else {
            Err(KeyError::UnknownKid(kid.to_string()))
        }
    }
}
