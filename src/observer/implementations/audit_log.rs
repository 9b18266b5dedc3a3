use async_trait::async_trait;
use serde_json::{json, Value};

use crate::observer::error::ObserverError;
use crate::observer::event::{EventKind, ForumEvent};
use crate::observer::traits::{EventObserver, ObserverRing};

/// Writes every forum event to the `forum::audit` tracing target.
/// Moderation actions are additionally stored in `moderation_actions` by the
/// service that performs them.
pub struct AuditLogObserver;

#[async_trait]
impl EventObserver for AuditLogObserver {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Audit
    }

    fn applies_to(&self, _kind: EventKind) -> bool {
        true
    }

    async fn execute(&self, event: &ForumEvent) -> Result<Vec<ForumEvent>, ObserverError> {
        let actor = event.actor_id().map(|id| id.to_string()).unwrap_or_else(|| "system".to_string());
        tracing::info!(
            target: "forum::audit",
            kind = ?event.kind(),
            actor = %actor,
            details = %audit_details(event),
            "forum event"
        );
        Ok(vec![])
    }
}

/// Identifiers only; bodies stay out of the logs
pub fn audit_details(event: &ForumEvent) -> Value {
    match event {
        ForumEvent::PostCreated { post, .. } => json!({ "post_id": post.id, "category_id": post.category_id }),
        ForumEvent::CommentCreated { comment, .. } => {
            json!({ "comment_id": comment.id, "post_id": comment.post_id, "parent_id": comment.parent_id })
        }
        ForumEvent::PostLiked { post_id, .. } => json!({ "post_id": post_id }),
        ForumEvent::MessageSent { message, .. } => {
            json!({ "message_id": message.id, "recipient_id": message.recipient_id })
        }
        ForumEvent::TrophyAwarded { user_id, trophy, .. } => json!({ "user_id": user_id, "trophy": trophy.slug }),
        ForumEvent::Moderation { action, .. } => json!({
            "action": action.action,
            "target_kind": action.target_kind,
            "target_id": action.target_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Message;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn message_details_leave_out_the_body() {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            body: "secret plans".to_string(),
            read_at: None,
            deleted_by_sender: false,
            deleted_by_recipient: false,
            created_at: Utc::now(),
        };
        let details = audit_details(&ForumEvent::MessageSent {
            message: message.clone(),
            sender_username: "alice".to_string(),
        });
        assert_eq!(details["recipient_id"], json!(message.recipient_id));
        assert!(!details.to_string().contains("secret"));
    }
}
