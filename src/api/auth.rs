//! Session endpoints.
//!
//! - POST `/register` - Create a customer account and start a session
//! - POST `/login` - Start a session
//! - POST `/refresh` - Rotate the refresh token (refresh cookie required)
//! - POST `/logout` - Revoke the refresh token and clear cookies
//! - GET `/self` - Current user's profile (access token required)

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::parse_json;
use crate::auth::{AnyRole, Auth, RefreshAuth, access_cookie, clear_cookies, refresh_cookie};
use crate::impl_has_auth_backend;
use crate::jwt::TokenVerifier;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::{IssuedSession, NewAccount, SessionService};

#[derive(Clone)]
pub struct AuthState {
    pub session: SessionService,
    pub verifier: TokenVerifier,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/self", get(whoami))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct IdResponse {
    id: i64,
}

/// Both credential cookies plus `{id}`.
fn session_response(status: StatusCode, issued: IssuedSession) -> impl IntoResponse {
    (
        status,
        AppendHeaders([
            (SET_COOKIE, access_cookie(&issued.access.token)),
            (SET_COOKIE, refresh_cookie(&issued.refresh.token)),
        ]),
        Json(IdResponse { id: issued.user_id }),
    )
}

async fn register(
    State(state): State<AuthState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = parse_json(body)?;
    let issued = state
        .session
        .register(NewAccount {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok(session_response(StatusCode::CREATED, issued))
}

async fn login(
    State(state): State<AuthState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = parse_json(body)?;
    let issued = state
        .session
        .login(&payload.email, &payload.password)
        .await?;

    Ok(session_response(StatusCode::OK, issued))
}

async fn refresh(
    State(state): State<AuthState>,
    RefreshAuth(session): RefreshAuth,
) -> Result<impl IntoResponse, ApiError> {
    let issued = state.session.refresh(&session).await?;
    Ok(session_response(StatusCode::OK, issued))
}

/// Logout - revoke the refresh record and clear both cookies.
async fn logout(
    State(state): State<AuthState>,
    RefreshAuth(session): RefreshAuth,
) -> Result<impl IntoResponse, ApiError> {
    state.session.logout(&session).await?;

    let [clear_access, clear_refresh] = clear_cookies();
    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(serde_json::json!({})),
    ))
}

async fn whoami(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.session.profile(auth.user_id).await?;
    Ok(Json(profile))
}
