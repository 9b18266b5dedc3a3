use axum::{extract::State, Extension};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::{ModerationAction, Post, Report, ReportStatus, User};
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, ListQuery, PathParam, QueryParams};
use crate::services::moderation_service::{BanOutcome, BanRequest, RemoveContent, ResolveReport};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
}

/// GET /api/moderation/reports?status=open|resolved|dismissed
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    QueryParams(by): QueryParams<ReportFilter>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<Report>> {
    let page = state
        .moderation()
        .list_reports(&current, by.status, list.into_filter()?)
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/moderation/reports/:id/resolve
pub async fn resolve_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(input): JsonBody<ResolveReport>,
) -> ApiResult<Report> {
    Ok(ApiResponse::success(state.moderation().resolve_report(&current, id, input).await?))
}

/// POST /api/moderation/users/:username/ban
pub async fn ban(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(username): PathParam<String>,
    JsonBody(input): JsonBody<BanRequest>,
) -> ApiResult<BanOutcome> {
    Ok(ApiResponse::success(state.moderation().ban(&current, &username, input).await?))
}

/// DELETE /api/moderation/users/:username/ban
pub async fn unban(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(username): PathParam<String>,
) -> ApiResult<User> {
    Ok(ApiResponse::success(state.moderation().unban(&current, &username).await?))
}

/// POST /api/moderation/remove
pub async fn remove_content(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<RemoveContent>,
) -> ApiResult<ModerationAction> {
    Ok(ApiResponse::success(state.moderation().remove_content(&current, input).await?))
}

/// GET /api/moderation/log
pub async fn audit_log(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<ModerationAction>> {
    Ok(ApiResponse::success(state.moderation().audit_log(&current, list.into_filter()?).await?))
}

/// POST /api/moderation/posts/:id/pin
pub async fn pin(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(state.posts().set_pinned(&current, id, true).await?))
}

/// DELETE /api/moderation/posts/:id/pin
pub async fn unpin(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(state.posts().set_pinned(&current, id, false).await?))
}

/// POST /api/moderation/posts/:id/lock
pub async fn lock(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(state.posts().set_locked(&current, id, true).await?))
}

/// DELETE /api/moderation/posts/:id/lock
pub async fn unlock(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(state.posts().set_locked(&current, id, false).await?))
}
