use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::database::models::User;
use crate::error::ApiError;
use crate::permissions::{EffectivePermissions, Ownership, PermissionKey, PermissionStore};
use crate::state::AppState;

/// The active user behind a request, with permissions resolved for this request only
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: User,
    pub permissions: EffectivePermissions,
}

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn can(&self, permission: &PermissionKey) -> bool {
        self.permissions.has_permission(permission)
    }

    pub fn require(&self, permission: &PermissionKey) -> Result<(), ApiError> {
        self.permissions.require(permission)
    }

    pub fn require_enhanced(&self, permission: &PermissionKey, owner_id: Uuid) -> Result<(), ApiError> {
        self.permissions.require_enhanced(permission, Ownership::of(owner_id))
    }
}

/// Loads the user named by the JWT, rejects deleted or banned accounts and
/// resolves their effective permissions
pub async fn validate_user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
        .bind(auth_user.user_id)
        .fetch_optional(state.pool())
        .await?
        .ok_or_else(|| {
            tracing::warn!(
                "User validation failed: user '{}' ({}) no longer exists",
                auth_user.username,
                auth_user.user_id
            );
            ApiError::unauthorized("User no longer exists")
        })?;

    if user.is_banned() {
        tracing::warn!("Rejected request from banned user '{}'", user.username);
        return Err(banned_error(&user));
    }

    let permissions = PermissionStore::new(state.pool().clone()).load_effective(&user).await?;

    tracing::debug!(
        "User validation successful: {} with {} permissions",
        user.username,
        permissions.permissions.len()
    );

    request.extensions_mut().insert(CurrentUser { user, permissions });

    Ok(next.run(request).await)
}

pub(crate) fn banned_error(user: &User) -> ApiError {
    let reason = user.ban_reason.as_deref().unwrap_or("no reason given");
    match user.banned_until {
        Some(until) => ApiError::forbidden(format!("Account banned until {}: {}", until.to_rfc3339(), reason)),
        None => ApiError::forbidden(format!("Account banned: {}", reason)),
    }
}
