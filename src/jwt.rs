//! Access and refresh token issuance and verification.
//!
//! Access tokens are RS256, short-lived and stateless. Refresh tokens are
//! HS256, long-lived, and carry the id of a persisted refresh record as `jti`
//! so that deleting the record revokes the token.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::UserRole;
use crate::keys::{
    ACCESS_TOKEN_ALGORITHM, KeyError, REFRESH_TOKEN_ALGORITHM, RefreshSecret, SigningKey,
    VerificationKeys,
};

/// Value of the `iss` claim on every token this service mints.
pub const ISSUER: &str = "auth-service";

/// Access token duration: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Refresh token duration: 1 year
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id, decimal)
    pub sub: String,
    pub role: UserRole,
    /// Tenant id (decimal), absent for users without a tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidSubject)
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant.as_deref().and_then(|t| t.parse().ok())
    }
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Refresh record id (decimal)
    pub jti: String,
    pub sub: String,
    pub role: UserRole,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidSubject)
    }

    pub fn record_id(&self) -> Result<i64, JwtError> {
        self.jti.parse().map_err(|_| JwtError::InvalidSubject)
    }
}

/// Identity placed into a new access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessTokenInput {
    pub user_id: i64,
    pub role: UserRole,
    pub tenant_id: Option<i64>,
}

/// Identity placed into a new refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTokenInput {
    pub user_id: i64,
    pub role: UserRole,
}

impl From<AccessTokenInput> for RefreshTokenInput {
    fn from(input: AccessTokenInput) -> Self {
        Self {
            user_id: input.user_id,
            role: input.role,
        }
    }
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    pub record_id: i64,
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Access token signing key is not configured")]
    SigningKeyMissing,
    #[error("Refresh token secret is not configured")]
    RefreshSecretMissing,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("System time error")]
    TimeError,
    #[error("Failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    #[error("Token asserts a disallowed algorithm")]
    WrongAlgorithm,
    #[error("Token header has no key id")]
    MissingKeyId,
    #[error("Token subject is malformed")]
    InvalidSubject,
}

fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

fn validation(alg: jsonwebtoken::Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.leeway = 0;
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation
}

/// Mints both token families. Either key may be absent, in which case the
/// corresponding operation fails with a configuration error.
#[derive(Clone, Default)]
pub struct TokenIssuer {
    signing_key: Option<SigningKey>,
    refresh_secret: Option<RefreshSecret>,
}

impl TokenIssuer {
    pub fn new(signing_key: Option<SigningKey>, refresh_secret: Option<RefreshSecret>) -> Self {
        Self {
            signing_key,
            refresh_secret,
        }
    }

    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    pub fn issue_access_token(
        &self,
        input: &AccessTokenInput,
    ) -> Result<AccessTokenResult, JwtError> {
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or(JwtError::SigningKeyMissing)?;
        let now = now_secs()?;

        let claims = AccessClaims {
            sub: input.user_id.to_string(),
            role: input.role,
            tenant: input.tenant_id.map(|t| t.to_string()),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + ACCESS_TOKEN_DURATION_SECS,
        };

        let mut header = Header::new(ACCESS_TOKEN_ALGORITHM);
        header.kid = Some(signing_key.kid().to_string());

        let token = jsonwebtoken::encode(&header, &claims, signing_key.encoding_key())
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            duration: ACCESS_TOKEN_DURATION_SECS,
        })
    }

    /// `record_id` must name a refresh record that was persisted for
    /// `input.user_id`.
    pub fn issue_refresh_token(
        &self,
        input: &RefreshTokenInput,
        record_id: i64,
    ) -> Result<RefreshTokenResult, JwtError> {
        let secret = self
            .refresh_secret
            .as_ref()
            .ok_or(JwtError::RefreshSecretMissing)?;
        let now = now_secs()?;
        let exp = now + REFRESH_TOKEN_DURATION_SECS;

        let claims = RefreshClaims {
            jti: record_id.to_string(),
            sub: input.user_id.to_string(),
            role: input.role,
            iss: ISSUER.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(REFRESH_TOKEN_ALGORITHM),
            &claims,
            secret.encoding_key(),
        )
        .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            record_id,
            expires_at: exp,
            duration: REFRESH_TOKEN_DURATION_SECS,
        })
    }
}

/// Verifies both token families. Access tokens are checked against public
/// keys only; the private key is never needed here.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<VerificationKeys>,
    refresh_secret: Option<RefreshSecret>,
}

impl TokenVerifier {
    pub fn new(keys: Arc<VerificationKeys>, refresh_secret: Option<RefreshSecret>) -> Self {
        Self {
            keys,
            refresh_secret,
        }
    }

    /// Validate and decode an access token.
    ///
    /// The header algorithm is checked before any key lookup so that a token
    /// asserting HS256 (or anything else) never reaches a verifier.
    pub async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let header = jsonwebtoken::decode_header(token).map_err(JwtError::Decoding)?;
        if header.alg != ACCESS_TOKEN_ALGORITHM {
            return Err(JwtError::WrongAlgorithm);
        }
        let kid = header.kid.ok_or(JwtError::MissingKeyId)?;
        let key = self.keys.decoding_key(&kid).await?;

        let token_data = jsonwebtoken::decode::<AccessClaims>(
            token,
            &key,
            &validation(ACCESS_TOKEN_ALGORITHM),
        )
        .map_err(JwtError::Decoding)?;

        token_data.claims.user_id()?;
        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token. Says nothing about whether the
    /// referenced record still exists.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let secret = self
            .refresh_secret
            .as_ref()
            .ok_or(JwtError::RefreshSecretMissing)?;

        let header = jsonwebtoken::decode_header(token).map_err(JwtError::Decoding)?;
        if header.alg != REFRESH_TOKEN_ALGORITHM {
            return Err(JwtError::WrongAlgorithm);
        }

        let token_data = jsonwebtoken::decode::<RefreshClaims>(
            token,
            secret.decoding_key(),
            &validation(REFRESH_TOKEN_ALGORITHM),
        )
        .map_err(JwtError::Decoding)?;

        token_data.claims.user_id()?;
        token_data.claims.record_id()?;
        Ok(token_data.claims)
    }
}
