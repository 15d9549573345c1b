mod common;

use std::time::{SystemTime, UNIX_EPOCH};

use auth_service::ServerConfig;
use auth_service::db::UserRole;
use auth_service::jwt::AccessClaims;
use auth_service::keys::RefreshSecret;
use axum::http::{StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::{
    REFRESH_SECRET, TestApp, bearer_json_request, bearer_request, empty_request, error_item,
    generate_key_pair, key_pair, signing_key,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn claims(user_id: i64, role: UserRole) -> AccessClaims {
    let iat = now();
    AccessClaims {
        sub: user_id.to_string(),
        role,
        tenant: None,
        iss: "auth-service".into(),
        iat,
        exp: iat + 3600,
    }
}

fn rs256_header() -> Header {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(signing_key().kid().to_string());
    header
}

fn sign_with_test_key(claims: &AccessClaims) -> String {
    let key = EncodingKey::from_rsa_pem(&key_pair().0).unwrap();
    encode(&rs256_header(), claims, &key).unwrap()
}

async fn assert_self_rejected(app: &TestApp, token: &str) {
    let response = app.send(bearer_request("GET", "/auth/self", token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let item = error_item(response).await;
    assert_eq!(item["type"], "Unauthenticated");
    assert!(item.get("ref").is_none());
}

#[tokio::test]
async fn test_forged_token_with_valid_claims_is_accepted_only_when_signed_correctly() {
    let app = TestApp::new().await;
    let session = app.register("sig@example.com").await;

    // Control: the gate accepts a well-formed token signed with the real key.
    let token = sign_with_test_key(&claims(session.user_id, UserRole::Customer));
    let response = app.send(bearer_request("GET", "/auth/self", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Same kid, different private key.
    let (other_private, _) = generate_key_pair();
    let forged = encode(
        &rs256_header(),
        &claims(session.user_id, UserRole::Admin),
        &EncodingKey::from_rsa_pem(&other_private).unwrap(),
    )
    .unwrap();
    assert_self_rejected(&app, &forged).await;
}

#[tokio::test]
async fn test_wrong_algorithm_rejected() {
    let app = TestApp::new().await;
    let session = app.register("alg@example.com").await;
    let claims = claims(session.user_id, UserRole::Admin);

    // HS256 keyed with the public key.
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(signing_key().kid().to_string());
    let token = encode(&header, &claims, &EncodingKey::from_secret(&key_pair().1)).unwrap();
    assert_self_rejected(&app, &token).await;

    // HS256 keyed with the refresh secret.
    let token = encode(&header, &claims, &EncodingKey::from_secret(REFRESH_SECRET)).unwrap();
    assert_self_rejected(&app, &token).await;

    // A refresh token is not an access token.
    assert_self_rejected(&app, &session.refresh).await;
}

#[tokio::test]
async fn test_alg_none_rejected() {
    let app = TestApp::new().await;
    let session = app.register("none@example.com").await;

    let header = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"alg":"none","typ":"JWT","kid":"{}"}}"#,
        signing_key().kid()
    ));
    let payload = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&claims(session.user_id, UserRole::Admin)).unwrap());
    assert_self_rejected(&app, &format!("{header}.{payload}.")).await;
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = TestApp::new().await;
    let session = app.register("old@example.com").await;

    let mut expired = claims(session.user_id, UserRole::Customer);
    expired.iat = now() - 7200;
    expired.exp = now() - 1;
    assert_self_rejected(&app, &sign_with_test_key(&expired)).await;
}

#[tokio::test]
async fn test_wrong_issuer_and_missing_kid_rejected() {
    let app = TestApp::new().await;
    let session = app.register("iss@example.com").await;

    let mut foreign = claims(session.user_id, UserRole::Customer);
    foreign.iss = "someone-else".into();
    assert_self_rejected(&app, &sign_with_test_key(&foreign)).await;

    let no_kid = encode(
        &Header::new(Algorithm::RS256),
        &claims(session.user_id, UserRole::Customer),
        &EncodingKey::from_rsa_pem(&key_pair().0).unwrap(),
    )
    .unwrap();
    assert_self_rejected(&app, &no_kid).await;

    let mut unknown_kid = rs256_header();
    unknown_kid.kid = Some("not-a-known-key".into());
    let token = encode(
        &unknown_kid,
        &claims(session.user_id, UserRole::Customer),
        &EncodingKey::from_rsa_pem(&key_pair().0).unwrap(),
    )
    .unwrap();
    assert_self_rejected(&app, &token).await;
}

#[tokio::test]
async fn test_malformed_credentials_rejected() {
    let app = TestApp::new().await;

    assert_self_rejected(&app, "not-a-jwt").await;

    // Empty bearer value falls through to the (absent) cookie.
    let response = app
        .send(
            common::request("GET", "/auth/self")
                .header(header::AUTHORIZATION, "Bearer ")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_route_without_credentials_is_unauthenticated() {
    let app = TestApp::new().await;

    for (method, uri) in [
        ("GET", "/users"),
        ("POST", "/users"),
        ("POST", "/tenants"),
        ("DELETE", "/tenants/1"),
    ] {
        let response = app.send(empty_request(method, uri)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        let item = error_item(response).await;
        assert_eq!(item["path"], uri);
    }
}

#[tokio::test]
async fn test_manager_on_admin_route_is_forbidden_without_side_effects() {
    let app = TestApp::new().await;
    let manager = app
        .session_with_role("manager@example.com", UserRole::Manager)
        .await;

    let response = app
        .send(bearer_json_request(
            "POST",
            "/tenants",
            &manager.access,
            serde_json::json!({ "name": "Acme", "address": "1 Road" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_item(response).await["type"], "Forbidden");
    assert!(app.db.tenants().list().await.unwrap().is_empty());

    let response = app
        .send(bearer_request("GET", "/users", &manager.access))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A customer fares no better.
    let customer = app.register("customer@example.com").await;
    let response = app
        .send(bearer_request("DELETE", &format!("/users/{}", manager.user_id), &customer.access))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.db.users().get_by_id(manager.user_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_role_comes_from_token_not_request() {
    let app = TestApp::new().await;
    let session = app.register("sneaky@example.com").await;

    let response = app
        .send(
            common::request("GET", "/users?role=admin")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access))
                .header("x-role", "admin")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_signing_key_is_internal_error() {
    let db = auth_service::db::Database::open(":memory:").await.unwrap();
    let app = TestApp::from_config(ServerConfig::new(
        db,
        None,
        Some(RefreshSecret::new(REFRESH_SECRET)),
    ));

    let response = app
        .send(common::json_request(
            "POST",
            "/auth/register",
            serde_json::json!({
                "firstName": "No",
                "lastName": "Key",
                "email": "nokey@example.com",
                "password": common::PASSWORD,
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let item = error_item(response).await;
    assert_eq!(item["type"], "SigningKeyMissing");
    assert_eq!(item["message"], "Internal Server Error");
    assert!(item["ref"].as_str().is_some());

    // The refresh record created for the failed session was dropped again.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(app.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}
