//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::Duration;

use crate::ServerConfig;
use crate::db::{Database, UserRole};
use crate::jwt::TokenIssuer;
use crate::keys::{RefreshSecret, SigningKey};
use crate::rate_limit::RateLimitConfig;
use crate::server_config;
use crate::session::{NewAccount, SessionService};
use clap::Parser;
use tracing::{error, info};
use url::Url;

const MIN_REFRESH_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "auth-service",
    about = "Token issuance, rotation and role-based access for a multi-tenant application"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5501")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "auth-service.db")]
    pub database: String,

    /// Path to the RSA private key (PEM) used to sign access tokens.
    /// Prefer using the PRIVATE_KEY env var instead
    #[arg(long)]
    pub private_key_file: Option<String>,

    /// Public key (PEM) of a recently rotated signing key. Still published so
    /// outstanding access tokens keep verifying. May be repeated
    #[arg(long)]
    pub previous_public_key_file: Vec<String>,

    /// Path to file containing the refresh token secret.
    /// Prefer using the REFRESH_TOKEN_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Fetch verification keys from this JWKS endpoint instead of using the
    /// local signing key
    #[arg(long, value_parser = validate_jwks_uri)]
    pub jwks_uri: Option<Url>,

    /// How long fetched verification keys are trusted
    #[arg(long, default_value = "600")]
    pub jwks_cache_ttl_secs: u64,

    /// Minimum time between keyset fetches triggered by the same unknown key id
    #[arg(long, default_value = "30")]
    pub jwks_refetch_secs: u64,

    /// Set the Secure flag on cookies (use behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Domain attribute for cookies
    #[arg(long)]
    pub cookie_domain: Option<String>,

    /// Development mode: include internal error detail in responses
    #[arg(long)]
    pub dev: bool,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Create an admin user with this email on startup.
    /// The password is read from the ADMIN_PASSWORD env var
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_jwks_uri(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid JWKS URI {s}: {e}"))?;

    let is_https = url.scheme() == "https";
    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    if !is_https && !(is_localhost && url.scheme() == "http") {
        return Err(format!(
            "JWKS URI must use HTTPS for non-localhost hosts: {s}"
        ));
    }

    Ok(url)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from an env var (removing it afterwards) or a file.
fn read_secret(env_var: &str, file: Option<&str>, what: &str) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        // SAFETY: only called from `main` before the tokio runtime is
        // built, so no other thread can be reading the environment.
        unsafe { std::env::remove_var(env_var) };
        return Some(value);
    }

    let Some(path) = file else {
        error!("{what} is required. Set {env_var} environment variable (recommended) or pass a file");
        return None;
    };
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            error!(path = %path, error = %e, "Failed to read {what} file");
            None
        }
    }
}

/// Load the access-token signing key from `PRIVATE_KEY` or a file.
/// Returns None and logs an error if the key cannot be loaded.
pub fn load_private_key(private_key_file: Option<&str>) -> Option<SigningKey> {
    let pem = read_secret("PRIVATE_KEY", private_key_file, "Private key")?;
    // Keys passed through env files often carry escaped newlines.
    let pem = pem.trim().replace("\\n", "\n");

    match SigningKey::from_pem(pem.as_bytes()) {
        Ok(key) => {
            info!(kid = %key.kid(), "Signing key loaded");
            Some(key)
        }
        Err(e) => {
            error!(error = %e, "Invalid private key");
            None
        }
    }
}

/// Read the rotated public keys that are still published.
pub fn load_previous_public_keys(paths: &[String]) -> Option<Vec<Vec<u8>>> {
    let mut keys = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read(path) {
            Ok(pem) => keys.push(pem),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read previous public key file");
                return None;
            }
        }
    }
    Some(keys)
}

/// Load the refresh token secret from `REFRESH_TOKEN_SECRET` or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_refresh_secret(refresh_secret_file: Option<&str>) -> Option<RefreshSecret> {
    let secret = read_secret(
        "REFRESH_TOKEN_SECRET",
        refresh_secret_file,
        "Refresh token secret",
    )?;
    parse_refresh_secret(secret.trim())
}

fn parse_refresh_secret(secret: &str) -> Option<RefreshSecret> {
    if secret.len() < MIN_REFRESH_SECRET_LENGTH {
        error!(
            "Refresh token secret is shorter than {} characters. Use a longer secret",
            MIN_REFRESH_SECRET_LENGTH
        );
        return None;
    }
    Some(RefreshSecret::new(secret.as_bytes()))
}

/// Take the `--create-admin` password out of `ADMIN_PASSWORD`.
///
/// Must run before the tokio runtime starts; see [`read_secret`].
pub fn take_admin_password() -> Option<String> {
    match std::env::var("ADMIN_PASSWORD") {
        Ok(password) => {
            // SAFETY: as in `read_secret`, no other thread exists yet.
            unsafe { std::env::remove_var("ADMIN_PASSWORD") };
            Some(password)
        }
        Err(_) => {
            error!("--create-admin requires the ADMIN_PASSWORD environment variable");
            None
        }
    }
}

/// Handle the --create-admin flag. An existing account with that email is
/// left alone.
pub async fn handle_create_admin(db: &Database, email: &str, password: String) {
    match db.users().is_email_taken(email).await {
        Ok(true) => {
            info!(email = %email, "Admin account already exists");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }

    // Creating a user issues no tokens, so no keys are needed here.
    let session = SessionService::new(db.clone(), Arc::new(TokenIssuer::default()));
    let account = NewAccount {
        first_name: "Admin".to_string(),
        last_name: "User".to_string(),
        email: email.to_string(),
        password,
    };
    match session.create_user(account, UserRole::Admin, None).await {
        Ok(id) => info!(user_id = id, email = %email, "Admin user created"),
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments and initialise the
/// process-wide flags.
pub fn build_config(
    args: &Args,
    db: Database,
    signing_key: SigningKey,
    previous_public_keys: Vec<Vec<u8>>,
    refresh_secret: RefreshSecret,
) -> ServerConfig {
    server_config::init(
        args.secure_cookies,
        args.cookie_domain.clone(),
        args.dev,
        args.trust_forwarded_for,
    );

    ServerConfig {
        db,
        signing_key: Some(signing_key),
        refresh_secret: Some(refresh_secret),
        previous_public_keys,
        jwks_uri: args.jwks_uri.clone(),
        jwks_cache_ttl: Duration::from_secs(args.jwks_cache_ttl_secs),
        jwks_refetch_interval: Duration::from_secs(args.jwks_refetch_secs),
        rate_limits: Arc::new(RateLimitConfig::new()),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
