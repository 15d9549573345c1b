pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod rate_limit;
pub mod server_config;
pub mod session;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::{TokenIssuer, TokenVerifier};
use keys::{
    DEFAULT_KEY_CACHE_TTL, DEFAULT_REFETCH_INTERVAL, HttpKeySetSource, KeyError, KeySetSource,
    RefreshSecret, SigningKey, StaticKeySetSource, VerificationKeys, published_key_set,
};
use rate_limit::RateLimitConfig;
use session::SessionService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// RSA key that signs access tokens. Without it, issuing fails with a 500.
    pub signing_key: Option<SigningKey>,
    /// HS256 secret for refresh tokens.
    pub refresh_secret: Option<RefreshSecret>,
    /// Public keys (PEM) of rotated signing keys that are still published.
    pub previous_public_keys: Vec<Vec<u8>>,
    /// Remote keyset for verification. When unset, the published keyset is
    /// used directly.
    pub jwks_uri: Option<Url>,
    pub jwks_cache_ttl: Duration,
    pub jwks_refetch_interval: Duration,
    pub rate_limits: Arc<RateLimitConfig>,
}

impl ServerConfig {
    /// Local keys, default cache timing and rate limits.
    pub fn new(
        db: Database,
        signing_key: Option<SigningKey>,
        refresh_secret: Option<RefreshSecret>,
    ) -> Self {
        Self {
            db,
            signing_key,
            refresh_secret,
            previous_public_keys: Vec::new(),
            jwks_uri: None,
            jwks_cache_ttl: DEFAULT_KEY_CACHE_TTL,
            jwks_refetch_interval: DEFAULT_REFETCH_INTERVAL,
            rate_limits: Arc::new(RateLimitConfig::new()),
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, KeyError> {
    let key_set = Arc::new(published_key_set(
        config.signing_key.as_ref(),
        &config.previous_public_keys,
    )?);

    let source: Arc<dyn KeySetSource> = match &config.jwks_uri {
        Some(uri) => {
            info!(uri = %uri, "Verifying access tokens against remote keyset");
            Arc::new(HttpKeySetSource::new(uri.clone())?)
        }
        None => Arc::new(StaticKeySetSource::new(key_set.as_ref().clone())),
    };
    let keys = Arc::new(VerificationKeys::with_timing(
        source,
        config.jwks_cache_ttl,
        config.jwks_refetch_interval,
    ));

    let issuer = Arc::new(TokenIssuer::new(
        config.signing_key.clone(),
        config.refresh_secret.clone(),
    ));
    let verifier = TokenVerifier::new(keys, config.refresh_secret.clone());
    let session = SessionService::new(config.db.clone(), issuer);

    Ok(create_api_router(
        session,
        verifier,
        key_set,
        config.rate_limits.clone(),
    ))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    cleanup::run_cleanup(&config.db, Some(&config.rate_limits)).await;
    cleanup::spawn_cleanup_scheduler(config.db.clone(), config.rate_limits.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
