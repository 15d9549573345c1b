//! Request gates: authentication by access or refresh token, then
//! authorization by role.
//!
//! Access tokens (RS256, 1 hour) are stateless and come from the
//! `Authorization: Bearer` header or the `accessToken` cookie. Refresh tokens
//! (HS256, 1 year) come only from the `refreshToken` cookie and are honoured
//! by the session flows only while their database record exists.

mod cookie;
mod errors;
mod extractors;
mod gate;
mod ip;
mod roles;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, access_cookie, clear_cookies, get_cookie,
    refresh_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, RefreshAuth};
pub use gate::{authenticate_access, authenticate_refresh, extract_access_token};
pub use ip::extract_client_ip;
pub use roles::{AdminOnly, AnyRole, RoleConstraint, require};
pub use state::HasAuthBackend;
pub use types::{AuthenticatedUser, RefreshSession};
