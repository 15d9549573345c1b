//! Role allow-lists.
//!
//! Every protected route names the exact roles it admits. There is no
//! hierarchy: admitting `Admin` says nothing about `Manager`.

use super::errors::AuthErrorKind;
use super::types::AuthenticatedUser;
use crate::db::UserRole;

/// Compile-time allow-list used as the type parameter of
/// [`Auth`](super::Auth).
pub trait RoleConstraint: Send + Sync + 'static {
    const ALLOWED: &'static [UserRole];
}

/// Any authenticated caller.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    const ALLOWED: &'static [UserRole] = &[UserRole::Customer, UserRole::Manager, UserRole::Admin];
}

pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const ALLOWED: &'static [UserRole] = &[UserRole::Admin];
}

/// Reject `user` unless its role is in `allowed`. Assumes authentication
/// already succeeded.
pub fn require(user: &AuthenticatedUser, allowed: &[UserRole]) -> Result<(), AuthErrorKind> {
    if allowed.contains(&user.role()) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = user.user_id,
            role = user.role().as_str(),
            "Role not permitted for route"
        );
        Err(AuthErrorKind::InsufficientRole)
    }
}
