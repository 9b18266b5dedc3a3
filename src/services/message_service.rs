use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{user_by_username, ServiceResult};
use crate::config;
use crate::database::models::Message;
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::CurrentUser;
use crate::observer::{ForumEvent, ObserverPipeline};
use crate::permissions::catalogue::MESSAGES_SEND;
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    /// Recipient username
    pub to: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessageUnread {
    pub unread: i64,
}

/// Which side of a message a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Sender,
    Recipient,
}

impl Side {
    pub fn of(message: &Message, user_id: Uuid) -> Option<Side> {
        if message.sender_id == user_id {
            Some(Side::Sender)
        } else if message.recipient_id == user_id {
            Some(Side::Recipient)
        } else {
            None
        }
    }

    fn column(self) -> &'static str {
        match self {
            Side::Sender => "deleted_by_sender",
            Side::Recipient => "deleted_by_recipient",
        }
    }
}

pub struct MessageService {
    pool: PgPool,
    events: Arc<ObserverPipeline>,
}

impl MessageService {
    pub fn new(pool: PgPool, events: Arc<ObserverPipeline>) -> Self {
        Self { pool, events }
    }

    pub async fn send(&self, current: &CurrentUser, input: SendMessage) -> ServiceResult<Message> {
        current.require(&MESSAGES_SEND)?;
        validation::message_body(&input.body).map_err(|msg| ApiError::invalid_field("body", msg))?;

        let recipient = user_by_username(&self.pool, input.to.trim()).await?;
        if recipient.id == current.id() {
            return Err(ApiError::bad_request("You cannot message yourself"));
        }
        if recipient.is_banned() {
            return Err(ApiError::forbidden(format!("User '{}' cannot receive messages", recipient.username)));
        }

        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (sender_id, recipient_id, body) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(current.id())
        .bind(recipient.id)
        .bind(&input.body)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Message {} sent from {} to {}", message.id, current.username(), recipient.username);
        self.events
            .emit(ForumEvent::MessageSent {
                message: message.clone(),
                sender_username: current.username().to_string(),
            })
            .await;
        Ok(message)
    }

    pub async fn inbox(&self, current: &CurrentUser, filter: FilterData) -> ServiceResult<Page<Message>> {
        let scope = json!({ "recipient_id": current.id(), "deleted_by_recipient": false });
        self.page(filter, scope, "created_at desc").await
    }

    pub async fn sent(&self, current: &CurrentUser, filter: FilterData) -> ServiceResult<Page<Message>> {
        let scope = json!({ "sender_id": current.id(), "deleted_by_sender": false });
        self.page(filter, scope, "created_at desc").await
    }

    /// Both directions with one user, oldest first
    pub async fn conversation(&self, current: &CurrentUser, other: &str, filter: FilterData) -> ServiceResult<Page<Message>> {
        let other = user_by_username(&self.pool, other).await?;
        let me = current.id();
        let scope = json!({
            "$or": [
                { "sender_id": me, "recipient_id": other.id, "deleted_by_sender": false },
                { "sender_id": other.id, "recipient_id": me, "deleted_by_recipient": false }
            ]
        });
        self.page(filter, scope, "created_at asc").await
    }

    async fn page(&self, filter: FilterData, scope: serde_json::Value, order: &str) -> ServiceResult<Page<Message>> {
        let page = Repository::<Message>::new("messages", self.pool.clone())
            .without_soft_delete()
            .page(filter, Some(scope), order, config::config().api.default_page_size)
            .await?;
        Ok(page)
    }

    /// Only the recipient can mark a message read
    pub async fn mark_read(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<Message> {
        let message = self.visible(current, id).await?;
        if Side::of(&message, current.id()) != Some(Side::Recipient) {
            return Err(ApiError::forbidden("Only the recipient can mark a message read"));
        }
        let message = sqlx::query_as::<_, Message>(
            "UPDATE messages SET read_at = COALESCE(read_at, now()) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    /// Hide the message from the caller's side; the row goes once both sides hid it
    pub async fn delete_for_self(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<()> {
        let message = self.visible(current, id).await?;
        let side = Side::of(&message, current.id()).ok_or_else(|| ApiError::not_found("Message not found"))?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, Message>(&format!(
            "UPDATE messages SET {} = TRUE WHERE id = $1 RETURNING *",
            side.column()
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if updated.deleted_by_sender && updated.deleted_by_recipient {
            sqlx::query("DELETE FROM messages WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tracing::debug!("Message {} removed after both sides deleted it", id);
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn unread_count(&self, current: &CurrentUser) -> ServiceResult<MessageUnread> {
        let unread = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE recipient_id = $1 AND read_at IS NULL AND deleted_by_recipient = FALSE",
        )
        .bind(current.id())
        .fetch_one(&self.pool)
        .await?;
        Ok(MessageUnread { unread })
    }

    /// Messages the caller is not party to, or has hidden, do not exist for them
    async fn visible(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<Message> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .filter(|m| m.involves(current.id()) && !m.hidden_for(current.id()))
            .ok_or_else(|| ApiError::not_found("Message not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(sender: Uuid, recipient: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            body: "hi".to_string(),
            read_at: None,
            deleted_by_sender: false,
            deleted_by_recipient: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn side_of_participants() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let m = message(a, b);
        assert_eq!(Side::of(&m, a), Some(Side::Sender));
        assert_eq!(Side::of(&m, b), Some(Side::Recipient));
        assert_eq!(Side::of(&m, c), None);
    }

    #[test]
    fn hiding_is_per_side() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut m = message(a, b);
        m.deleted_by_sender = true;
        assert!(m.hidden_for(a));
        assert!(!m.hidden_for(b));
    }
}
