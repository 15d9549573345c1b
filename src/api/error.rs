//! Shared error handling for API endpoints.
//!
//! Every error body has the shape
//! `{"errors":[{"ref"?, "type", "message", "path"}]}`. Handlers do not know
//! the request path, so responses carry their [`ErrorBody`] as an extension
//! and [`attach_error_path`] re-renders it with the path filled in.

use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::error::AuthError;
use crate::server_config;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InvalidCredentials(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    TooManyRequests(String),
    /// `kind` is shown to callers; `detail` only in development mode.
    Internal { kind: &'static str, detail: String },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            kind: "InternalError",
            detail: detail.into(),
        }
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        Self::Internal {
            kind: "StoreFailure",
            detail: format!("{context}: {e}"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidCredentials(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(msg) => Self::BadRequest(msg),
            AuthError::InvalidCredentials => {
                Self::InvalidCredentials(AuthError::InvalidCredentials.to_string())
            }
            AuthError::Unauthenticated => Self::Unauthorized(AuthError::Unauthenticated.to_string()),
            AuthError::Forbidden => Self::Forbidden(AuthError::Forbidden.to_string()),
            AuthError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal {
                kind: other.kind_name(),
                detail: other.to_string(),
            },
        }
    }
}

/// One entry of the error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorItem {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub path: String,
}

/// Full error body. Also stored as a response extension.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorItem>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message, reference) = match self {
            ApiError::BadRequest(msg) => ("InvalidInput", msg, None),
            ApiError::InvalidCredentials(msg) => ("InvalidCredentials", msg, None),
            ApiError::Unauthorized(msg) => ("Unauthenticated", msg, None),
            ApiError::Forbidden(msg) => ("Forbidden", msg, None),
            ApiError::NotFound(msg) => ("NotFound", msg, None),
            ApiError::TooManyRequests(msg) => ("TooManyRequests", msg, None),
            ApiError::Internal { kind, detail } => {
                let reference = Uuid::new_v4().to_string();
                error!(error_ref = %reference, kind, detail = %detail, "Request failed");
                let message = if server_config::dev_mode() {
                    detail
                } else {
                    "Internal Server Error".to_string()
                };
                (kind, message, Some(reference))
            }
        };

        let body = ErrorBody {
            errors: vec![ErrorItem {
                reference,
                kind: kind.to_string(),
                message,
                path: String::new(),
            }],
        };
        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// Middleware that fills in the `path` of error bodies.
pub async fn attach_error_path(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let Some(mut body) = response.extensions_mut().remove::<ErrorBody>() else {
        return response;
    };
    for item in &mut body.errors {
        item.path.clone_from(&path);
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let rendered = Json(body).into_response();
    Response::from_parts(parts, rendered.into_body())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = ApiError::bad_request("Email is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        let item = &json["errors"][0];
        assert_eq!(item["type"], "InvalidInput");
        assert_eq!(item["message"], "Email is required");
        assert!(item.get("ref").is_none());
    }

    #[tokio::test]
    async fn test_internal_errors_get_reference_and_hide_detail() {
        let response =
            ApiError::from(AuthError::StoreFailure("disk I/O error".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        let item = &json["errors"][0];
        assert_eq!(item["type"], "StoreFailure");
        assert_eq!(item["message"], "Internal Server Error");
        assert!(Uuid::parse_str(item["ref"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_auth_error_status_mapping() {
        let cases = [
            (AuthError::invalid_input("x"), StatusCode::BAD_REQUEST),
            (AuthError::InvalidCredentials, StatusCode::BAD_REQUEST),
            (AuthError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AuthError::Forbidden, StatusCode::FORBIDDEN),
            (AuthError::not_found("x"), StatusCode::NOT_FOUND),
            (
                AuthError::KeyUnavailable("k".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AuthError::SigningKeyMissing, StatusCode::INTERNAL_SERVER_ERROR),
            (
                AuthError::StoreFailure("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_path_is_attached() {
        use axum::{Router, body::Body, routing::get};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/missing",
                get(|| async { ApiError::not_found("Tenant not found") }),
            )
            .layer(axum::middleware::from_fn(attach_error_path));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["errors"][0]["path"], "/missing");
        assert_eq!(json["errors"][0]["type"], "NotFound");
    }
}
