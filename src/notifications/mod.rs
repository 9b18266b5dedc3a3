//! Real-time notification fan-out.
//!
//! Stored rows are the source of truth. The hub only pushes freshly created
//! notifications to whoever is listening right now; a subscriber that falls
//! behind skips what it missed and can re-read the list endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod hub;
pub mod mentions;

pub use hub::NotificationHub;
pub use mentions::extract_mentions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CommentReply,
    PostComment,
    Message,
    TrophyAwarded,
    Mention,
    Moderation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CommentReply => "comment_reply",
            NotificationKind::PostComment => "post_comment",
            NotificationKind::Message => "message",
            NotificationKind::TrophyAwarded => "trophy_awarded",
            NotificationKind::Mention => "mention",
            NotificationKind::Moderation => "moderation",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment_reply" => Ok(NotificationKind::CommentReply),
            "post_comment" => Ok(NotificationKind::PostComment),
            "message" => Ok(NotificationKind::Message),
            "trophy_awarded" => Ok(NotificationKind::TrophyAwarded),
            "mention" => Ok(NotificationKind::Mention),
            "moderation" => Ok(NotificationKind::Moderation),
            other => Err(format!("Unknown notification kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_text_form() {
        assert_eq!(NotificationKind::CommentReply.to_string(), "comment_reply");
        assert_eq!("mention".parse::<NotificationKind>().unwrap(), NotificationKind::Mention);
        assert!("digest".parse::<NotificationKind>().is_err());
        assert_eq!(
            serde_json::to_value(NotificationKind::TrophyAwarded).unwrap(),
            serde_json::json!("trophy_awarded")
        );
    }
}
