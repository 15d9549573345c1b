//! Tenant management.
//!
//! Reads are public; writes require the admin role.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ResultExt};
use super::{parse_id, parse_json};
use crate::auth::{AdminOnly, Auth};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenVerifier;

const MAX_NAME_LEN: usize = 100;
const MAX_ADDRESS_LEN: usize = 255;

#[derive(Clone)]
pub struct TenantsState {
    pub db: Database,
    pub verifier: TokenVerifier,
}

impl_has_auth_backend!(TenantsState);

pub fn router(state: TenantsState) -> Router {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .route(
            "/{id}",
            get(get_tenant).patch(update_tenant).delete(delete_tenant),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct TenantRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
}

impl TenantRequest {
    fn validate(&self) -> Result<(&str, &str), ApiError> {
        let name = self.name.trim();
        let address = self.address.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("Tenant name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ApiError::bad_request(format!(
                "Tenant name cannot be longer than {MAX_NAME_LEN} characters"
            )));
        }
        if address.is_empty() {
            return Err(ApiError::bad_request("Tenant address is required"));
        }
        if address.chars().count() > MAX_ADDRESS_LEN {
            return Err(ApiError::bad_request(format!(
                "Tenant address cannot be longer than {MAX_ADDRESS_LEN} characters"
            )));
        }
        Ok((name, address))
    }
}

#[derive(Serialize)]
struct IdResponse {
    id: i64,
}

async fn create_tenant(
    State(state): State<TenantsState>,
    auth: Auth<AdminOnly>,
    body: Result<Json<TenantRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = parse_json(body)?;
    let (name, address) = payload.validate()?;

    let id = state
        .db
        .tenants()
        .create(name, address)
        .await
        .db_err("Failed to create tenant")?;

    info!(tenant_id = id, admin_id = auth.user_id, "Tenant created");
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

async fn list_tenants(State(state): State<TenantsState>) -> Result<impl IntoResponse, ApiError> {
    let tenants = state
        .db
        .tenants()
        .list()
        .await
        .db_err("Failed to list tenants")?;
    Ok(Json(tenants))
}

async fn get_tenant(
    State(state): State<TenantsState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Tenant not found")?;
    let tenant = state
        .db
        .tenants()
        .get(id)
        .await
        .db_err("Failed to get tenant")?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))?;
    Ok(Json(tenant))
}

async fn update_tenant(
    State(state): State<TenantsState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    body: Result<Json<TenantRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Tenant not found")?;
    let payload = parse_json(body)?;
    let (name, address) = payload.validate()?;

    let updated = state
        .db
        .tenants()
        .update(id, name, address)
        .await
        .db_err("Failed to update tenant")?;
    if !updated {
        return Err(ApiError::not_found("Tenant not found"));
    }

    info!(tenant_id = id, admin_id = auth.user_id, "Tenant updated");
    Ok(Json(IdResponse { id }))
}

async fn delete_tenant(
    State(state): State<TenantsState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Tenant not found")?;
    let deleted = state
        .db
        .tenants()
        .delete(id)
        .await
        .db_err("Failed to delete tenant")?;
    if !deleted {
        return Err(ApiError::not_found("Tenant not found"));
    }

    info!(tenant_id = id, admin_id = auth.user_id, "Tenant deleted");
    Ok(Json(serde_json::json!({})))
}
