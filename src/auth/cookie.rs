//! Cookie parsing and construction for the two credential cookies.

use axum::http::header;

use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS};
use crate::server_config;

/// Cookie name for the access token (1 hour).
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token (1 year).
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

fn build_cookie(name: &str, value: &str, max_age: u64) -> String {
    let mut cookie = format!("{name}={value}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age}");
    if server_config::secure_cookies() {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = server_config::cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// `Set-Cookie` value carrying an access token.
pub fn access_cookie(token: &str) -> String {
    build_cookie(ACCESS_COOKIE_NAME, token, ACCESS_TOKEN_DURATION_SECS)
}

/// `Set-Cookie` value carrying a refresh token.
pub fn refresh_cookie(token: &str) -> String {
    build_cookie(REFRESH_COOKIE_NAME, token, REFRESH_TOKEN_DURATION_SECS)
}

/// `Set-Cookie` values that remove both credential cookies.
pub fn clear_cookies() -> [String; 2] {
    [
        build_cookie(ACCESS_COOKIE_NAME, "", 0),
        build_cookie(REFRESH_COOKIE_NAME, "", 0),
    ]
}
