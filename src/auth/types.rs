//! Authenticated identities produced by the gates.

use crate::db::UserRole;
use crate::jwt::{AccessClaims, RefreshClaims};

/// Caller identity established from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// JWT claims from the access token
    pub claims: AccessClaims,
    /// Parsed `sub`
    pub user_id: i64,
}

impl AuthenticatedUser {
    pub fn role(&self) -> UserRole {
        self.claims.role
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.claims.tenant_id()
    }
}

/// Caller identity established from a verified refresh token. The referenced
/// record has not been checked yet.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub claims: RefreshClaims,
    /// Parsed `sub`
    pub user_id: i64,
    /// Parsed `jti`
    pub record_id: i64,
}
