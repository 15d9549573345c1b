//! User administration. Every route requires the admin role.

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ResultExt};
use super::{parse_id, parse_json};
use crate::auth::{AdminOnly, Auth};
use crate::db::{UserFilter, UserProfile, UserRole, UserUpdate};
use crate::impl_has_auth_backend;
use crate::jwt::TokenVerifier;
use crate::session::{NewAccount, SessionService};

const MAX_PER_PAGE: u32 = 100;
const MAX_NAME_LEN: usize = 100;

#[derive(Clone)]
pub struct UsersState {
    pub session: SessionService,
    pub verifier: TokenVerifier,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .with_state(state)
}

fn parse_role(value: &str) -> Option<UserRole> {
    match value.trim() {
        "customer" => Some(UserRole::Customer),
        "manager" => Some(UserRole::Manager),
        "admin" => Some(UserRole::Admin),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    /// Defaults to `manager`.
    role: Option<String>,
    tenant_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    role: String,
    tenant_id: Option<i64>,
}

/// Query parameters arrive as strings so malformed numbers fall back to the
/// defaults instead of rejecting the request.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListUsersQuery {
    q: Option<String>,
    role: Option<String>,
    current_page: Option<String>,
    per_page: Option<String>,
}

impl ListUsersQuery {
    fn into_filter(self) -> UserFilter {
        let defaults = UserFilter::default();
        let page = self
            .current_page
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults.page);
        let per_page = self
            .per_page
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults.per_page)
            .min(MAX_PER_PAGE);

        UserFilter {
            q: self.q.map(|q| q.trim().to_string()).unwrap_or_default(),
            role: self.role.as_deref().and_then(parse_role),
            page,
            per_page,
        }
    }
}

#[derive(Serialize)]
struct IdResponse {
    id: i64,
}

async fn create_user(
    State(state): State<UsersState>,
    auth: Auth<AdminOnly>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = parse_json(body)?;
    let role = match payload.role.as_deref() {
        None => UserRole::Manager,
        Some(value) => parse_role(value).ok_or_else(|| ApiError::bad_request("Invalid role"))?,
    };

    let id = state
        .session
        .create_user(
            NewAccount {
                first_name: payload.first_name,
                last_name: payload.last_name,
                email: payload.email,
                password: payload.password,
            },
            role,
            payload.tenant_id,
        )
        .await?;

    info!(user_id = id, role = role.as_str(), admin_id = auth.user_id, "User created by admin");
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.map(|Query(q)| q).unwrap_or_default().into_filter();
    let page = state
        .session
        .db()
        .users()
        .list(&filter)
        .await
        .db_err("Failed to list users")?;
    Ok(Json(page))
}

async fn get_user(
    State(state): State<UsersState>,
    _auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "User not found")?;
    let user = state
        .session
        .db()
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserProfile::from(user)))
}

async fn update_user(
    State(state): State<UsersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "User not found")?;
    let payload = parse_json(body)?;

    let first_name = payload.first_name.trim();
    let last_name = payload.last_name.trim();
    if first_name.is_empty() {
        return Err(ApiError::bad_request("First name is required"));
    }
    if last_name.is_empty() {
        return Err(ApiError::bad_request("Last name is required"));
    }
    if first_name.chars().count() > MAX_NAME_LEN || last_name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Names cannot be longer than {MAX_NAME_LEN} characters"
        )));
    }
    let role = parse_role(&payload.role).ok_or_else(|| ApiError::bad_request("Invalid role"))?;

    let db = state.session.db();
    if let Some(tenant_id) = payload.tenant_id {
        let exists = db
            .tenants()
            .get(tenant_id)
            .await
            .db_err("Failed to get tenant")?
            .is_some();
        if !exists {
            return Err(ApiError::bad_request("Tenant does not exist"));
        }
    }

    let update = UserUpdate {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        role,
        tenant_id: payload.tenant_id,
    };
    let updated = db
        .users()
        .update(id, &update)
        .await
        .db_err("Failed to update user")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = id, role = role.as_str(), admin_id = auth.user_id, "User updated by admin");
    Ok(Json(IdResponse { id }))
}

async fn delete_user(
    State(state): State<UsersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "User not found")?;
    let deleted = state
        .session
        .db()
        .users()
        .delete(id)
        .await
        .db_err("Failed to delete user")?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = id, admin_id = auth.user_id, "User deleted by admin");
    Ok(Json(serde_json::json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(current_page: Option<&str>, per_page: Option<&str>) -> ListUsersQuery {
        ListUsersQuery {
            current_page: current_page.map(String::from),
            per_page: per_page.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_list_query_defaults() {
        let filter = ListUsersQuery::default().into_filter();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.per_page, 6);
        assert!(filter.q.is_empty());
        assert!(filter.role.is_none());
    }

    #[test]
    fn test_list_query_malformed_numbers_fall_back() {
        let filter = query(Some("abc"), Some("-3")).into_filter();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.per_page, 6);

        let filter = query(Some("0"), Some("1000")).into_filter();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.per_page, MAX_PER_PAGE);

        let filter = query(Some("3"), Some("10")).into_filter();
        assert_eq!(filter.page, 3);
        assert_eq!(filter.per_page, 10);
    }

    #[test]
    fn test_list_query_unknown_role_is_ignored() {
        let filter = ListUsersQuery {
            role: Some("superuser".into()),
            ..Default::default()
        }
        .into_filter();
        assert!(filter.role.is_none());

        let filter = ListUsersQuery {
            role: Some("manager".into()),
            q: Some("  ann ".into()),
            ..Default::default()
        }
        .into_filter();
        assert_eq!(filter.role, Some(UserRole::Manager));
        assert_eq!(filter.q, "ann");
    }
}
