use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use super::{user_by_id, user_by_username, ServiceResult};
use crate::config;
use crate::database::models::{Message, ModerationAction, Report, ReportStatus, TargetKind, User};
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::CurrentUser;
use crate::observer::{ForumEvent, ObserverPipeline};
use crate::permissions::catalogue::{
    ADMIN_MANAGE_ROLES, MODERATION_BAN, MODERATION_REMOVE_CONTENT, MODERATION_VIEW_LOG, REPORTS_CREATE,
    REPORTS_RESOLVE, REPORTS_VIEW,
};
use crate::permissions::PermissionStore;
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct FileReport {
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReport {
    /// `resolved` or `dismissed`
    pub status: ReportStatus,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub reason: String,
    /// Permanent when absent
    pub duration_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveContent {
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub reason: String,
}

/// Ban state as returned to moderators
#[derive(Debug, Serialize)]
pub struct BanOutcome {
    pub user_id: Uuid,
    pub username: String,
    pub banned_until: Option<DateTime<Utc>>,
    pub reason: String,
}

/// Insert one audit row. Runs on the caller's connection so it commits with
/// the action it records.
pub(crate) async fn record_action(
    conn: &mut PgConnection,
    moderator_id: Option<Uuid>,
    action: &str,
    target_kind: TargetKind,
    target_id: Uuid,
    reason: &str,
) -> ServiceResult<ModerationAction> {
    let row = sqlx::query_as::<_, ModerationAction>(
        r#"
        INSERT INTO moderation_actions (moderator_id, action, target_kind, target_id, reason)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(moderator_id)
    .bind(action)
    .bind(target_kind.as_str())
    .bind(target_id)
    .bind(reason)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// End of a ban starting at `now`; `None` means permanent
pub fn ban_expiry(now: DateTime<Utc>, duration_hours: Option<i64>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match duration_hours {
        None => Ok(None),
        Some(h) if h <= 0 => Err(ApiError::invalid_field("duration_hours", "Duration must be positive")),
        Some(h) if h > 24 * 365 * 100 => Err(ApiError::invalid_field("duration_hours", "Duration is too long")),
        Some(h) => Ok(Some(now + Duration::hours(h))),
    }
}

pub struct ModerationService {
    pool: PgPool,
    events: Arc<ObserverPipeline>,
}

impl ModerationService {
    pub fn new(pool: PgPool, events: Arc<ObserverPipeline>) -> Self {
        Self { pool, events }
    }

    pub async fn file_report(&self, current: &CurrentUser, input: FileReport) -> ServiceResult<Report> {
        current.require(&REPORTS_CREATE)?;
        validation::reason(&input.reason).map_err(|msg| ApiError::invalid_field("reason", msg))?;

        match input.target_kind {
            TargetKind::User if input.target_id == current.id() => {
                return Err(ApiError::bad_request("You cannot report yourself"));
            }
            TargetKind::Message => {
                let message = self.message(input.target_id).await?;
                // Only participants know the message exists
                if !message.involves(current.id()) {
                    return Err(ApiError::not_found("Message not found"));
                }
            }
            kind => {
                self.content_owner(kind, input.target_id).await?;
            }
        }

        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (reporter_id, target_kind, target_id, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(current.id())
        .bind(input.target_kind.as_str())
        .bind(input.target_id)
        .bind(input.reason.trim())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("You already have an open report for this item"),
            other => other,
        })?;

        tracing::info!(
            "Report {} filed by {} against {} {}",
            report.id,
            current.username(),
            report.target_kind,
            report.target_id
        );
        Ok(report)
    }

    /// Open reports unless the filter says otherwise
    pub async fn list_reports(
        &self,
        current: &CurrentUser,
        status: Option<ReportStatus>,
        filter: FilterData,
    ) -> ServiceResult<Page<Report>> {
        current.require(&REPORTS_VIEW)?;
        let status = status.unwrap_or(ReportStatus::Open);
        let page = Repository::<Report>::new("reports", self.pool.clone())
            .without_soft_delete()
            .page(
                filter,
                Some(serde_json::json!({ "status": status.as_str() })),
                "created_at asc",
                config::config().api.default_page_size,
            )
            .await?;
        Ok(page)
    }

    pub async fn resolve_report(&self, current: &CurrentUser, id: Uuid, input: ResolveReport) -> ServiceResult<Report> {
        current.require(&REPORTS_RESOLVE)?;
        if input.status == ReportStatus::Open {
            return Err(ApiError::invalid_field("status", "Status must be 'resolved' or 'dismissed'"));
        }

        let mut tx = self.pool.begin().await?;
        let report = sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports
            SET status = $2, resolved_by = $3, resolution_note = $4, resolved_at = now()
            WHERE id = $1 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.status.as_str())
        .bind(current.id())
        .bind(input.note.trim())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(report) = report else {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM reports WHERE id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists {
                ApiError::conflict("Report is already closed")
            } else {
                ApiError::not_found("Report not found")
            });
        };

        let action_name = format!("report_{}", input.status.as_str());
        let target_kind: TargetKind = report.target_kind.parse().map_err(ApiError::internal_server_error)?;
        let action = record_action(
            &mut tx,
            Some(current.id()),
            &action_name,
            target_kind,
            report.target_id,
            input.note.trim(),
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Report {} {} by {}", report.id, report.status, current.username());
        self.events
            .emit(ForumEvent::Moderation {
                action,
                subject_user_id: None,
            })
            .await;
        Ok(report)
    }

    pub async fn ban(&self, current: &CurrentUser, username: &str, input: BanRequest) -> ServiceResult<BanOutcome> {
        current.require(&MODERATION_BAN)?;
        let target = user_by_username(&self.pool, username).await?;

        if target.id == current.id() {
            return Err(ApiError::bad_request("You cannot ban yourself"));
        }

        // Moderators cannot ban each other; that takes an administrator
        let target_permissions = PermissionStore::new(self.pool.clone()).load_effective(&target).await?;
        if target_permissions.has_permission(&MODERATION_BAN) && !current.can(&ADMIN_MANAGE_ROLES) {
            tracing::warn!("{} tried to ban fellow moderator {}", current.username(), target.username);
            return Err(ApiError::forbidden(format!(
                "Banning a moderator requires '{}'",
                ADMIN_MANAGE_ROLES
            )));
        }

        self.apply_ban(Some(current.id()), &target, &input).await
    }

    /// Ban without a permission check; `moderator_id` is `None` from the command line
    pub async fn apply_ban(&self, moderator_id: Option<Uuid>, target: &User, input: &BanRequest) -> ServiceResult<BanOutcome> {
        validation::reason(&input.reason).map_err(|msg| ApiError::invalid_field("reason", msg))?;
        let banned_until = ban_expiry(Utc::now(), input.duration_hours)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE users SET banned_at = now(), banned_until = $2, ban_reason = $3, updated_at = now() WHERE id = $1",
        )
        .bind(target.id)
        .bind(banned_until)
        .bind(input.reason.trim())
        .execute(&mut *tx)
        .await?;
        let action = record_action(&mut tx, moderator_id, "ban", TargetKind::User, target.id, input.reason.trim()).await?;
        tx.commit().await?;

        tracing::info!("User '{}' banned until {:?}", target.username, banned_until);
        self.events
            .emit(ForumEvent::Moderation {
                action,
                subject_user_id: Some(target.id),
            })
            .await;

        Ok(BanOutcome {
            user_id: target.id,
            username: target.username.clone(),
            banned_until,
            reason: input.reason.trim().to_string(),
        })
    }

    pub async fn unban(&self, current: &CurrentUser, username: &str) -> ServiceResult<User> {
        current.require(&MODERATION_BAN)?;
        let target = user_by_username(&self.pool, username).await?;
        self.apply_unban(Some(current.id()), &target).await
    }

    pub async fn apply_unban(&self, moderator_id: Option<Uuid>, target: &User) -> ServiceResult<User> {
        if target.banned_at.is_none() {
            return Err(ApiError::conflict(format!("User '{}' is not banned", target.username)));
        }

        let mut tx = self.pool.begin().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET banned_at = NULL, banned_until = NULL, ban_reason = NULL, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(target.id)
        .fetch_one(&mut *tx)
        .await?;
        let action = record_action(&mut tx, moderator_id, "unban", TargetKind::User, target.id, "").await?;
        tx.commit().await?;

        tracing::info!("User '{}' unbanned", user.username);
        self.events
            .emit(ForumEvent::Moderation {
                action,
                subject_user_id: Some(user.id),
            })
            .await;
        Ok(user)
    }

    /// Soft-delete a post or comment on moderation grounds
    pub async fn remove_content(&self, current: &CurrentUser, input: RemoveContent) -> ServiceResult<ModerationAction> {
        current.require(&MODERATION_REMOVE_CONTENT)?;
        validation::reason(&input.reason).map_err(|msg| ApiError::invalid_field("reason", msg))?;

        let table = match input.target_kind {
            TargetKind::Post => "posts",
            TargetKind::Comment => "comments",
            other => {
                return Err(ApiError::invalid_field(
                    "target_kind",
                    format!("Cannot remove a {}; only posts and comments", other),
                ))
            }
        };

        let mut tx = self.pool.begin().await?;
        let author_id = sqlx::query_scalar::<_, Uuid>(&format!(
            "UPDATE {} SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL RETURNING author_id",
            table
        ))
        .bind(input.target_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", capitalize(input.target_kind.as_str()))))?;

        let action = record_action(
            &mut tx,
            Some(current.id()),
            "remove_content",
            input.target_kind,
            input.target_id,
            input.reason.trim(),
        )
        .await?;
        tx.commit().await?;

        tracing::info!("{} {} removed by {}", input.target_kind, input.target_id, current.username());
        self.events
            .emit(ForumEvent::Moderation {
                action: action.clone(),
                subject_user_id: Some(author_id),
            })
            .await;
        Ok(action)
    }

    pub async fn audit_log(&self, current: &CurrentUser, filter: FilterData) -> ServiceResult<Page<ModerationAction>> {
        current.require(&MODERATION_VIEW_LOG)?;
        let page = Repository::<ModerationAction>::new("moderation_actions", self.pool.clone())
            .without_soft_delete()
            .page(filter, None, "created_at desc", config::config().api.default_page_size)
            .await?;
        Ok(page)
    }

    async fn message(&self, id: Uuid) -> ServiceResult<Message> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Message not found"))
    }

    /// Owner of a reportable post, comment or user; 404 when it is gone
    async fn content_owner(&self, kind: TargetKind, id: Uuid) -> ServiceResult<Uuid> {
        let owner = match kind {
            TargetKind::Post => {
                sqlx::query_scalar::<_, Uuid>("SELECT author_id FROM posts WHERE id = $1 AND deleted_at IS NULL")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            TargetKind::Comment => {
                sqlx::query_scalar::<_, Uuid>("SELECT author_id FROM comments WHERE id = $1 AND deleted_at IS NULL")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            TargetKind::User => Some(user_by_id(&self.pool, id).await?.id),
            TargetKind::Message => Some(self.message(id).await?.sender_id),
        };
        owner.ok_or_else(|| ApiError::not_found(format!("{} not found", capitalize(kind.as_str()))))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_ban_has_no_expiry() {
        assert_eq!(ban_expiry(Utc::now(), None).unwrap(), None);
    }

    #[test]
    fn temporary_ban_expires_after_duration() {
        let now = Utc::now();
        assert_eq!(ban_expiry(now, Some(24)).unwrap(), Some(now + Duration::hours(24)));
    }

    #[test]
    fn rejects_non_positive_durations() {
        assert_eq!(ban_expiry(Utc::now(), Some(0)).unwrap_err().status_code(), 400);
        assert!(ban_expiry(Utc::now(), Some(-5)).is_err());
    }

    #[test]
    fn capitalizes_target_names() {
        assert_eq!(capitalize("post"), "Post");
        assert_eq!(capitalize(""), "");
    }
}
