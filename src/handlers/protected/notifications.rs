use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config;
use crate::database::models::Notification;
use crate::database::Page;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, ListQuery, PathParam, QueryParams};
use crate::services::notification_service::UnreadCount;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// GET /api/notifications?unread=true
pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    QueryParams(only): QueryParams<NotificationFilter>,
    QueryParams(list): QueryParams<ListQuery>,
) -> ApiResult<Page<Notification>> {
    let page = state
        .notifications()
        .list(current.id(), only.unread, list.into_filter()?)
        .await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/notifications/unread
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<UnreadCount> {
    Ok(ApiResponse::success(state.notifications().unread_count(current.id()).await?))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Notification> {
    Ok(ApiResponse::success(state.notifications().mark_read(current.id(), id).await?))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<MarkedRead> {
    let updated = state.notifications().mark_all_read(current.id()).await?;
    Ok(ApiResponse::success(MarkedRead { updated }))
}

/// GET /api/notifications/stream - Server-Sent Events of new notifications.
/// Events missed while the client lagged are skipped; the stored rows remain.
pub async fn stream(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::debug!("Notification stream opened for {}", current.username());
    let events = state.hub.stream_for(current.id()).map(|notification| {
        Event::default()
            .event(notification.kind.as_str())
            .id(notification.id.to_string())
            .json_data(&notification)
    });

    let keep_alive = Duration::from_secs(config::config().notifications.keep_alive_secs);
    Sse::new(events).keep_alive(KeepAlive::new().interval(keep_alive))
}
