use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub deleted_by_sender: bool,
    pub deleted_by_recipient: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }

    /// Whether `user_id` has hidden this message from their own view
    pub fn hidden_for(&self, user_id: Uuid) -> bool {
        (self.sender_id == user_id && self.deleted_by_sender)
            || (self.recipient_id == user_id && self.deleted_by_recipient)
    }
}
