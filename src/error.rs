//! Error taxonomy shared by the token lifecycle and the session flows.

use thiserror::Error;

use crate::jwt::JwtError;
use crate::keys::KeyError;
use crate::password::PasswordError;

/// Errors surfaced by the session and gate logic.
///
/// Each variant maps to exactly one HTTP status class in
/// [`crate::api::ApiError`]. Messages are safe to show to callers; internal
/// detail travels in the wrapped `String` and is only exposed in development
/// mode.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Caller-fixable input problem (400).
    #[error("{0}")]
    InvalidInput(String),
    /// Unknown email or wrong password (400). Deliberately vague.
    #[error("Email or password does not match")]
    InvalidCredentials,
    /// Missing, malformed, expired, revoked or wrong-algorithm token (401).
    #[error("Not authenticated")]
    Unauthenticated,
    /// Valid identity, insufficient role (403).
    #[error("Insufficient permissions")]
    Forbidden,
    /// Addressed entity does not exist (404).
    #[error("{0}")]
    NotFound(String),
    /// No verification key could be resolved for a token (500).
    #[error("Verification key unavailable: {0}")]
    KeyUnavailable(String),
    /// No private key configured for access tokens (500).
    #[error("Access token signing key is not configured")]
    SigningKeyMissing,
    /// No shared secret configured for refresh tokens (500).
    #[error("Refresh token secret is not configured")]
    RefreshSecretMissing,
    /// Persistence collaborator failed (500).
    #[error("Store failure: {0}")]
    StoreFailure(String),
    /// Any other server-side fault (500).
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Short machine-readable name used as the `type` field of error bodies.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInput",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::Unauthenticated => "Unauthenticated",
            Self::Forbidden => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::KeyUnavailable(_) => "KeyUnavailable",
            Self::SigningKeyMissing => "SigningKeyMissing",
            Self::RefreshSecretMissing => "RefreshSecretMissing",
            Self::StoreFailure(_) => "StoreFailure",
            Self::Internal(_) => "InternalError",
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        Self::StoreFailure(e.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<KeyError> for AuthError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::Unavailable(kid) => Self::KeyUnavailable(kid),
            KeyError::UnknownKid(_) => Self::Unauthenticated,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::SigningKeyMissing => Self::SigningKeyMissing,
            JwtError::RefreshSecretMissing => Self::RefreshSecretMissing,
            JwtError::Key(key_err) => key_err.into(),
            JwtError::Encoding(e) => Self::Internal(format!("Failed to encode token: {e}")),
            JwtError::TimeError => Self::Internal("System time error".into()),
            JwtError::Decoding(_)
            | JwtError::WrongAlgorithm
            | JwtError::MissingKeyId
            | JwtError::InvalidSubject => Self::Unauthenticated,
        }
    }
}
