use async_trait::async_trait;
use std::future::Future;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::notifications::{extract_mentions, NotificationHub, NotificationKind};
use crate::observer::error::ObserverError;
use crate::observer::event::{EventKind, ForumEvent};
use crate::observer::traits::{EventObserver, ObserverRing};
use crate::services::NotificationService;

/// Turns events into stored notifications and pushes them to live streams
pub struct NotificationObserver {
    pool: PgPool,
    notifications: NotificationService,
}

impl NotificationObserver {
    pub fn new(pool: PgPool, hub: NotificationHub) -> Self {
        Self {
            notifications: NotificationService::new(pool.clone(), hub),
            pool,
        }
    }

    /// Ids of the mentioned users that exist, skipping `exclude`
    async fn resolve_mentions(&self, body: &str, exclude: &[Uuid]) -> Result<Vec<Uuid>, ObserverError> {
        let names = extract_mentions(body);
        if names.is_empty() {
            return Ok(vec![]);
        }
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE lower(username) = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().filter(|id| !exclude.contains(id)).collect())
    }

    async fn send(&self, recipients: Vec<(Uuid, NotificationKind)>, payload: &Value) -> Result<(), ObserverError> {
        deliver_all(recipients, |user_id, kind| async move {
            self.notifications.create(user_id, kind, payload.clone()).await.map(|_| ())
        })
        .await
    }
}

/// Runs `deliver` for every recipient. One failure does not stop the rest;
/// the first error is returned once all have been tried.
pub async fn deliver_all<F, Fut, E>(recipients: Vec<(Uuid, NotificationKind)>, deliver: F) -> Result<(), ObserverError>
where
    F: Fn(Uuid, NotificationKind) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<ObserverError>,
{
    let mut first_error = None;
    let mut failed = 0usize;
    for (user_id, kind) in recipients {
        if let Err(e) = deliver(user_id, kind).await {
            let e: ObserverError = e.into();
            tracing::warn!(%user_id, ?kind, error = %e, "notification not delivered");
            failed += 1;
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) if failed > 1 => Err(ObserverError::ServiceError(format!("{} notifications failed, first: {}", failed, e))),
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Who hears about a new comment. A reply to the post author's own comment
/// produces one reply notification, not two.
pub fn comment_recipients(
    commenter: Uuid,
    post_author: Uuid,
    parent_author: Option<Uuid>,
) -> Vec<(Uuid, NotificationKind)> {
    let mut recipients = Vec::new();
    if let Some(parent_author) = parent_author {
        if parent_author != commenter {
            recipients.push((parent_author, NotificationKind::CommentReply));
        }
    }
    if post_author != commenter && Some(post_author) != parent_author {
        recipients.push((post_author, NotificationKind::PostComment));
    }
    recipients
}

#[async_trait]
impl EventObserver for NotificationObserver {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Notification
    }

    fn applies_to(&self, kind: EventKind) -> bool {
        !matches!(kind, EventKind::PostLiked)
    }

    async fn execute(&self, event: &ForumEvent) -> Result<Vec<ForumEvent>, ObserverError> {
        match event {
            ForumEvent::PostCreated { post, author_username } => {
                let payload = json!({
                    "post_id": post.id,
                    "post_title": post.title,
                    "from": author_username,
                });
                let mentioned = self.resolve_mentions(&post.body, &[post.author_id]).await?;
                self.send(mentioned.into_iter().map(|id| (id, NotificationKind::Mention)).collect(), &payload)
                    .await?;
            }
            ForumEvent::CommentCreated {
                comment,
                author_username,
                post_title,
                post_author_id,
                parent_author_id,
            } => {
                let payload = json!({
                    "post_id": comment.post_id,
                    "post_title": post_title,
                    "comment_id": comment.id,
                    "from": author_username,
                });
                let mut recipients = comment_recipients(comment.author_id, *post_author_id, *parent_author_id);

                let mut exclude: Vec<Uuid> = recipients.iter().map(|(id, _)| *id).collect();
                exclude.push(comment.author_id);
                let mentioned = self.resolve_mentions(&comment.body, &exclude).await?;
                recipients.extend(mentioned.into_iter().map(|id| (id, NotificationKind::Mention)));

                self.send(recipients, &payload).await?;
            }
            ForumEvent::MessageSent { message, sender_username } => {
                let payload = json!({ "message_id": message.id, "from": sender_username });
                self.send(vec![(message.recipient_id, NotificationKind::Message)], &payload)
                    .await?;
            }
            ForumEvent::TrophyAwarded { user_id, trophy, .. } => {
                let payload = json!({
                    "trophy_id": trophy.id,
                    "trophy": trophy.slug,
                    "name": trophy.name,
                    "icon": trophy.icon,
                });
                self.send(vec![(*user_id, NotificationKind::TrophyAwarded)], &payload).await?;
            }
            ForumEvent::Moderation { action, subject_user_id } => {
                if let Some(subject) = subject_user_id.filter(|s| Some(*s) != action.moderator_id) {
                    let payload = json!({
                        "action": action.action,
                        "target_kind": action.target_kind,
                        "target_id": action.target_id,
                        "reason": action.reason,
                    });
                    self.send(vec![(subject, NotificationKind::Moderation)], &payload).await?;
                }
            }
            ForumEvent::PostLiked { .. } => {}
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_comment_notifies_post_author() {
        let (me, author) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(comment_recipients(me, author, None), vec![(author, NotificationKind::PostComment)]);
    }

    #[test]
    fn commenting_on_own_post_notifies_nobody() {
        let me = Uuid::new_v4();
        assert!(comment_recipients(me, me, None).is_empty());
        assert!(comment_recipients(me, me, Some(me)).is_empty());
    }

    #[test]
    fn reply_notifies_parent_and_post_author() {
        let (me, author, parent) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            comment_recipients(me, author, Some(parent)),
            vec![(parent, NotificationKind::CommentReply), (author, NotificationKind::PostComment)]
        );
    }

    #[test]
    fn reply_to_post_author_is_a_single_notification() {
        let (me, author) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            comment_recipients(me, author, Some(author)),
            vec![(author, NotificationKind::CommentReply)]
        );
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_stop_the_rest() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let delivered = std::sync::Mutex::new(Vec::new());
        let recipients = vec![
            (a, NotificationKind::CommentReply),
            (b, NotificationKind::PostComment),
            (c, NotificationKind::Mention),
        ];

        let result = deliver_all(recipients, |user_id, _| {
            let delivered = &delivered;
            async move {
                if user_id == a {
                    return Err(ObserverError::DatabaseError("connection reset".to_string()));
                }
                delivered.lock().unwrap().push(user_id);
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(ObserverError::DatabaseError(_))));
        assert_eq!(*delivered.lock().unwrap(), vec![b, c]);
    }
}
