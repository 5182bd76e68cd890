//! Authentication context and authorization guards.
//!
//! The core never validates credentials or parses tokens — that is the
//! calling edge's job. Every mutating service method instead receives an
//! already-resolved [`AuthContext`] and runs it through one of these small
//! `authorize_*` guards before touching a store.

use crate::error::{AppError, DomainError, Result};
use crate::types::entities::PorterProfile;
use crate::types::enums::Role;
use crate::types::primitives::UserId;

/// The resolved principal behind a service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    /// The user account making the call.
    pub user_id: UserId,
    /// The role that account was granted.
    pub role: Role,
}

impl AuthContext {
    /// Build a new authentication context.
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Require that the caller either owns `profile` or holds an admin-scoped role.
///
/// # Errors
///
/// Returns [`DomainError::Forbidden`] otherwise.
pub fn authorize_porter_owner(ctx: &AuthContext, profile: &PorterProfile) -> Result<()> {
    if ctx.role.is_admin_scoped() || ctx.user_id == profile.user_id {
        Ok(())
    } else {
        Err(AppError::Domain(DomainError::Forbidden(
            "caller does not own this porter profile".into(),
        )))
    }
}

/// Require an admin-scoped role (suspend, verify, reject, and other
/// platform-staff-only mutations).
///
/// # Errors
///
/// Returns [`DomainError::Forbidden`] otherwise.
pub fn authorize_admin(ctx: &AuthContext) -> Result<()> {
    if ctx.role.is_admin_scoped() {
        Ok(())
    } else {
        Err(AppError::Domain(DomainError::Forbidden(
            "admin privileges required".into(),
        )))
    }
}
