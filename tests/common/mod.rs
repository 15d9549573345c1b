#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use auth_service::db::{Database, UserRole, UserUpdate};
use auth_service::keys::{RefreshSecret, SigningKey};
use auth_service::rate_limit::RateLimitConfig;
use auth_service::{ServerConfig, create_app};
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, header},
};
use openssl::rsa::Rsa;
use tower::ServiceExt;

pub const REFRESH_SECRET: &[u8] = b"integration-test-refresh-secret-0123456789";
pub const PASSWORD: &str = "correct-horse-battery";

/// (private PEM, public PEM), generated once per test binary.
pub fn key_pair() -> &'static (Vec<u8>, Vec<u8>) {
    static KEYS: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();
    KEYS.get_or_init(generate_key_pair)
}

pub fn generate_key_pair() -> (Vec<u8>, Vec<u8>) {
    let rsa = Rsa::generate(2048).expect("Failed to generate RSA key");
    (
        rsa.private_key_to_pem().expect("Failed to encode private key"),
        rsa.public_key_to_pem().expect("Failed to encode public key"),
    )
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_pem(&key_pair().0).expect("Invalid test key")
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_rate_limits(RateLimitConfig::permissive()).await
    }

    pub async fn with_rate_limits(rate_limits: RateLimitConfig) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let mut config = ServerConfig::new(
            db.clone(),
            Some(signing_key()),
            Some(RefreshSecret::new(REFRESH_SECRET)),
        );
        config.rate_limits = Arc::new(rate_limits);
        Self::from_config(config)
    }

    pub fn from_config(config: ServerConfig) -> Self {
        let app = create_app(&config).expect("Failed to build app");
        Self {
            app,
            db: config.db,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Register a customer and return the issued session.
    pub async fn register(&self, email: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/auth/register",
                serde_json::json!({
                    "firstName": "Test",
                    "lastName": "User",
                    "email": email,
                    "password": PASSWORD,
                }),
            ))
            .await;
        assert_eq!(response.status(), 201, "registration failed");
        Session::from_response(response).await
    }

    pub async fn login(&self, email: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 200, "login failed");
        Session::from_response(response).await
    }

    /// Register a user, give it `role`, and log in again so the token
    /// carries the role.
    pub async fn session_with_role(&self, email: &str, role: UserRole) -> Session {
        let registered = self.register(email).await;
        self.db
            .users()
            .update(
                registered.user_id,
                &UserUpdate {
                    first_name: "Test".into(),
                    last_name: "User".into(),
                    role,
                    tenant_id: None,
                },
            )
            .await
            .unwrap();
        self.login(email).await
    }
}

/// Tokens and id from a register/login/refresh response.
pub struct Session {
    pub user_id: i64,
    pub access: String,
    pub refresh: String,
}

impl Session {
    pub async fn from_response(response: Response<Body>) -> Self {
        let access = cookie_value(&response, "accessToken").expect("access cookie");
        let refresh = cookie_value(&response, "refreshToken").expect("refresh cookie");
        let json = body_json(response).await;
        Self {
            user_id: json["id"].as_i64().expect("id in body"),
            access,
            refresh,
        }
    }
}

fn peer() -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
}

/// Request builder carrying the peer address the rate limiters key on.
pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(peer())
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    request(method, uri).body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    request(method, uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    request(method, uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn bearer_json_request(
    method: &str,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Request<Body> {
    request(method, uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn refresh_request(uri: &str, refresh_token: &str) -> Request<Body> {
    request("POST", uri)
        .header(header::COOKIE, format!("refreshToken={refresh_token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

/// Value of a `Set-Cookie` header by cookie name.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?;
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The single error entry of an error response.
pub async fn error_item(response: Response<Body>) -> serde_json::Value {
    let json = body_json(response).await;
    let errors = json["errors"].as_array().expect("errors array");
    assert_eq!(errors.len(), 1);
    errors[0].clone()
}
