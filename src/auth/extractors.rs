//! Axum extractors for authentication.
//!
//! Extractors run in handler-signature order, so placing `Auth<R>` before the
//! body extractor means a rejected request never has its body parsed.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::ApiAuthError;
use super::gate::{authenticate_access, authenticate_refresh};
use super::roles::{AnyRole, RoleConstraint, require};
use super::state::HasAuthBackend;
use super::types::{AuthenticatedUser, RefreshSession};

/// Access-token gate followed by the role gate for `R`.
pub struct Auth<R: RoleConstraint = AnyRole> {
    user: AuthenticatedUser,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Auth<R> {
    pub fn into_inner(self) -> AuthenticatedUser {
        self.user
    }
}

impl<R: RoleConstraint> Deref for Auth<R> {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = authenticate_access(&parts.headers, state.verifier()).await?;
        require(&user, R::ALLOWED)?;
        Ok(Self {
            user,
            _role: PhantomData,
        })
    }
}

/// Refresh-token gate. Signature, expiry and issuer only; whether the
/// referenced record still exists is for the handler to decide.
pub struct RefreshAuth(pub RefreshSession);

impl<S> FromRequestParts<S> for RefreshAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_refresh(&parts.headers, state.verifier())
            .map(RefreshAuth)
            .map_err(ApiAuthError::from)
    }
}
