use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceResult;
use crate::config;
use crate::database::models::Notification;
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::notifications::{NotificationHub, NotificationKind};

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

/// Stored notifications plus real-time push of new ones
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    hub: NotificationHub,
}

impl NotificationService {
    pub fn new(pool: PgPool, hub: NotificationHub) -> Self {
        Self { pool, hub }
    }

    /// Store a notification, then push it to any live subscriber
    pub async fn create(&self, user_id: Uuid, kind: NotificationKind, payload: Value) -> ServiceResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, kind, payload) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;

        let delivered = self.hub.publish(notification.clone());
        tracing::debug!("Notification {} ({}) pushed to {} subscribers", notification.id, kind, delivered);
        Ok(notification)
    }

    pub async fn list(&self, user_id: Uuid, unread_only: bool, filter: FilterData) -> ServiceResult<Page<Notification>> {
        let mut scope = json!({ "user_id": user_id });
        if unread_only {
            scope["read_at"] = json!({ "$null": true });
        }
        let page = Repository::<Notification>::new("notifications", self.pool.clone())
            .without_soft_delete()
            .page(filter, Some(scope), "created_at desc", config::config().api.default_page_size)
            .await?;
        Ok(page)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> ServiceResult<UnreadCount> {
        let unread = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(UnreadCount { unread })
    }

    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> ServiceResult<Notification> {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET read_at = COALESCE(read_at, now()) WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification not found"))
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, user_id: Uuid) -> ServiceResult<u64> {
        let result = sqlx::query("UPDATE notifications SET read_at = now() WHERE user_id = $1 AND read_at IS NULL")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
