// Forum operations. Each service validates input, checks permissions
// against the caller's effective permissions, then talks to Postgres.

use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::User;
use crate::error::ApiError;

pub mod admin_service;
pub mod auth_service;
pub mod category_service;
pub mod comment_service;
pub mod message_service;
pub mod moderation_service;
pub mod notification_service;
pub mod post_service;
pub mod search_service;
pub mod trophy_service;

pub use admin_service::AdminService;
pub use auth_service::AuthService;
pub use category_service::CategoryService;
pub use comment_service::CommentService;
pub use message_service::MessageService;
pub use moderation_service::ModerationService;
pub use notification_service::NotificationService;
pub use post_service::PostService;
pub use search_service::SearchService;
pub use trophy_service::{TrophyLedger, TrophyService};

pub type ServiceResult<T> = Result<T, ApiError>;

pub(crate) async fn user_by_id(pool: &PgPool, id: Uuid) -> ServiceResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Usernames are matched case-insensitively
pub(crate) async fn user_by_username(pool: &PgPool, username: &str) -> ServiceResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(username) = lower($1) AND deleted_at IS NULL")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User '{}' not found", username)))
}
