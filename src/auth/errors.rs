//! Authentication error types.

use axum::response::{IntoResponse, Response};

use crate::api::ApiError;
use crate::error::AuthError;
use crate::jwt::JwtError;

/// Why a gate rejected a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No credential was presented.
    NotAuthenticated,
    /// A credential was presented and failed verification.
    InvalidToken,
    /// The caller's role is not in the route's allow-list.
    InsufficientRole,
    /// No verification key could be resolved.
    KeyUnavailable(String),
    /// Token keys are not configured on this server.
    Misconfigured(&'static str),
}

impl From<JwtError> for AuthErrorKind {
    fn from(e: JwtError) -> Self {
        match AuthError::from(e) {
            AuthError::KeyUnavailable(kid) => Self::KeyUnavailable(kid),
            AuthError::RefreshSecretMissing => Self::Misconfigured("Refresh token secret is not configured"),
            AuthError::SigningKeyMissing => Self::Misconfigured("Access token signing key is not configured"),
            _ => Self::InvalidToken,
        }
    }
}

impl From<AuthErrorKind> for AuthError {
    fn from(kind: AuthErrorKind) -> Self {
        match kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::InvalidToken => {
                AuthError::Unauthenticated
            }
            AuthErrorKind::InsufficientRole => AuthError::Forbidden,
            AuthErrorKind::KeyUnavailable(kid) => AuthError::KeyUnavailable(kid),
            AuthErrorKind::Misconfigured(msg) => AuthError::Internal(msg.to_string()),
        }
    }
}

/// Gate rejection rendered with the shared API error body.
///
/// Cookies are left untouched so that a client holding a valid refresh token
/// can still refresh after its access token is rejected.
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        ApiError::from(AuthError::from(self.kind)).into_response()
    }
}
