//! Token extraction and verification for incoming requests.
//!
//! Access gate: `Authorization: Bearer` header first, then the `accessToken`
//! cookie; RS256 against the verification keyset. Refresh gate: the
//! `refreshToken` cookie only; HS256 against the shared secret.

use axum::http::{HeaderMap, header};
use tracing::debug;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use super::errors::AuthErrorKind;
use super::types::{AuthenticatedUser, RefreshSession};
use crate::jwt::TokenVerifier;

const BEARER_PREFIX: &str = "bearer ";

/// Pick the access token from a request. A bearer header that is empty after
/// the scheme falls through to the cookie.
pub fn extract_access_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let prefix = value.get(..BEARER_PREFIX.len())?;
            prefix
                .eq_ignore_ascii_case(BEARER_PREFIX)
                .then(|| value[BEARER_PREFIX.len()..].trim())
        })
        .filter(|token| !token.is_empty());

    bearer.or_else(|| get_cookie(headers, ACCESS_COOKIE_NAME).filter(|t| !t.is_empty()))
}

pub async fn authenticate_access(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<AuthenticatedUser, AuthErrorKind> {
    let token = extract_access_token(headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = verifier.verify_access_token(token).await.map_err(|e| {
        debug!(error = %e, "Access token rejected");
        AuthErrorKind::from(e)
    })?;
    let user_id = claims.user_id().map_err(AuthErrorKind::from)?;

    Ok(AuthenticatedUser { claims, user_id })
}

pub fn authenticate_refresh(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<RefreshSession, AuthErrorKind> {
    let token = get_cookie(headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = verifier.verify_refresh_token(token).map_err(|e| {
        debug!(error = %e, "Refresh token rejected");
        AuthErrorKind::from(e)
    })?;
    let user_id = claims.user_id().map_err(AuthErrorKind::from)?;
    let record_id = claims.record_id().map_err(AuthErrorKind::from)?;

    Ok(RefreshSession {
        claims,
        user_id,
        record_id,
    })
}
