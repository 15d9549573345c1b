mod auth;
mod error;
mod keys;
mod tenants;
mod users;

use axum::{
    Json, Router, extract::rejection::JsonRejection, middleware, response::IntoResponse,
    routing::get,
};
use jsonwebtoken::jwk::JwkSet;
use std::sync::Arc;

use crate::jwt::TokenVerifier;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionService;

pub use auth::AuthState;
pub use error::{ApiError, ErrorBody, ErrorItem, ResultExt, attach_error_path};
pub use keys::KeysState;
pub use tenants::TenantsState;
pub use users::UsersState;

/// Unwrap a JSON body, turning malformed or mistyped input into a 400 with
/// the usual error envelope.
pub fn parse_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Parse a numeric path id. Anything that is not an id cannot name an
/// existing row, so it is reported as not found.
pub fn parse_id(raw: &str, not_found: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::not_found(not_found))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn fallback() -> ApiError {
    ApiError::not_found("Not found")
}

/// Create the API router.
pub fn create_api_router(
    session: SessionService,
    verifier: TokenVerifier,
    key_set: Arc<JwkSet>,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = AuthState {
        session: session.clone(),
        verifier: verifier.clone(),
        rate_limit_config,
    };

    let tenants_state = TenantsState {
        db: session.db().clone(),
        verifier: verifier.clone(),
    };

    let users_state = UsersState { session, verifier };

    let keys_state = KeysState { key_set };

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(auth_state))
        .nest("/tenants", tenants::router(tenants_state))
        .nest("/users", users::router(users_state))
        .merge(keys::router(keys_state))
        .fallback(fallback)
        .layer(middleware::from_fn(attach_error_path))
}
