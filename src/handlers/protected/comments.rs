use axum::{extract::State, Extension};
use uuid::Uuid;

use crate::database::models::Comment;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, PathParam};
use crate::services::comment_service::{CreateComment, UpdateComment};
use crate::state::AppState;

/// POST /api/posts/:id/comments
pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(post_id): PathParam<Uuid>,
    JsonBody(input): JsonBody<CreateComment>,
) -> ApiResult<Comment> {
    Ok(ApiResponse::created(state.comments().create(&current, post_id, input).await?))
}

/// PATCH /api/comments/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(input): JsonBody<UpdateComment>,
) -> ApiResult<Comment> {
    Ok(ApiResponse::success(state.comments().update(&current, id, input).await?))
}

/// DELETE /api/comments/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<()> {
    state.comments().delete(&current, id).await?;
    Ok(ApiResponse::no_content())
}
