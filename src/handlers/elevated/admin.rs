use axum::{extract::State, Extension};

use crate::database::models::{PermissionRow, Role, User};
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, ListQuery, PathParam, QueryParams, VisibilityQuery};
use crate::permissions::store::RoleWithPermissions;
use crate::permissions::EffectivePermissions;
use crate::services::admin_service::{CreateRole, PermissionRequest, SetPrimaryRole, SetSecondaryRoles, SiteStats};
use crate::state::AppState;

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    QueryParams(list): QueryParams<ListQuery>,
    QueryParams(visibility): QueryParams<VisibilityQuery>,
) -> ApiResult<Page<User>> {
    let page = state
        .admin()
        .list_users(&current, list.into_filter()?, visibility.include_deleted)
        .await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/admin/users/:username/access
pub async fn user_access(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(username): PathParam<String>,
) -> ApiResult<EffectivePermissions> {
    Ok(ApiResponse::success(state.admin().access_of(&current, &username).await?))
}

/// PUT /api/admin/users/:username/primary-role
pub async fn set_primary_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(username): PathParam<String>,
    JsonBody(input): JsonBody<SetPrimaryRole>,
) -> ApiResult<EffectivePermissions> {
    let access = state.admin().set_primary_role(&current, &username, &input.role).await?;
    Ok(ApiResponse::success(access))
}

/// PUT /api/admin/users/:username/roles
pub async fn set_secondary_roles(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(username): PathParam<String>,
    JsonBody(input): JsonBody<SetSecondaryRoles>,
) -> ApiResult<EffectivePermissions> {
    let access = state.admin().set_secondary_roles(&current, &username, &input.roles).await?;
    Ok(ApiResponse::success(access))
}

/// GET /api/admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Vec<RoleWithPermissions>> {
    Ok(ApiResponse::success(state.admin().list_roles(&current).await?))
}

/// POST /api/admin/roles
pub async fn create_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<CreateRole>,
) -> ApiResult<Role> {
    Ok(ApiResponse::created(state.admin().create_role(&current, input).await?))
}

/// DELETE /api/admin/roles/:name
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(name): PathParam<String>,
) -> ApiResult<()> {
    state.admin().delete_role(&current, &name).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/admin/roles/:name/permissions/:permission
pub async fn grant(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam((role, permission)): PathParam<(String, String)>,
) -> ApiResult<()> {
    state.admin().grant(&current, &role, &permission).await?;
    Ok(ApiResponse::no_content())
}

/// DELETE /api/admin/roles/:name/permissions/:permission
pub async fn revoke(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam((role, permission)): PathParam<(String, String)>,
) -> ApiResult<()> {
    state.admin().revoke(&current, &role, &permission).await?;
    Ok(ApiResponse::no_content())
}

/// GET /api/admin/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Vec<PermissionRow>> {
    Ok(ApiResponse::success(state.admin().list_permissions(&current).await?))
}

/// POST /api/admin/permissions
pub async fn create_permission(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<PermissionRequest>,
) -> ApiResult<PermissionRow> {
    Ok(ApiResponse::created(state.admin().create_permission(&current, input).await?))
}

/// GET /api/admin/stats
pub async fn stats(State(state): State<AppState>, Extension(current): Extension<CurrentUser>) -> ApiResult<SiteStats> {
    Ok(ApiResponse::success(state.admin().stats(&current).await?))
}
