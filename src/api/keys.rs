//! Public keyset endpoint.
//!
//! - GET `/.well-known/jwks.json` - Current and recently rotated public keys

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::header::CACHE_CONTROL,
    response::IntoResponse,
    routing::get,
};
use jsonwebtoken::jwk::JwkSet;

#[derive(Clone)]
pub struct KeysState {
    pub key_set: Arc<JwkSet>,
}

pub fn router(state: KeysState) -> Router {
    Router::new()
        .route("/.well-known/jwks.json", get(jwks))
        .with_state(state)
}

async fn jwks(State(state): State<KeysState>) -> impl IntoResponse {
    (
        [(CACHE_CONTROL, "public, max-age=600")],
        Json(state.key_set.as_ref().clone()),
    )
}
