use axum::{extract::State, Extension};
use uuid::Uuid;

use crate::database::models::Message;
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, JsonBody, ListQuery, PathParam, QueryParams};
use crate::services::message_service::{MessageUnread, SendMessage};
use crate::state::AppState;

/// POST /api/messages
pub async fn send(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    JsonBody(input): JsonBody<SendMessage>,
) -> ApiResult<Message> {
    Ok(ApiResponse::created(state.messages().send(&current, input).await?))
}

/// GET /api/messages/inbox
pub async fn inbox(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<Message>> {
    Ok(ApiResponse::success(state.messages().inbox(&current, list.into_filter()?).await?))
}

/// GET /api/messages/sent
pub async fn sent(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<Message>> {
    Ok(ApiResponse::success(state.messages().sent(&current, list.into_filter()?).await?))
}

/// GET /api/messages/with/:username
pub async fn conversation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(username): PathParam<String>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<Message>> {
    let page = state.messages().conversation(&current, &username, list.into_filter()?).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/messages/unread
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<MessageUnread> {
    Ok(ApiResponse::success(state.messages().unread_count(&current).await?))
}

/// POST /api/messages/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Message> {
    Ok(ApiResponse::success(state.messages().mark_read(&current, id).await?))
}

/// DELETE /api/messages/:id - hides it from the caller only
pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<()> {
    state.messages().delete_for_self(&current, id).await?;
    Ok(ApiResponse::no_content())
}
