use uuid::Uuid;

use crate::database::models::{Comment, Message, ModerationAction, Post, Trophy};

/// Discriminant of [`ForumEvent`], used for observer routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PostCreated,
    CommentCreated,
    PostLiked,
    MessageSent,
    TrophyAwarded,
    Moderation,
}

/// A completed write that observers may react to
#[derive(Debug, Clone)]
pub enum ForumEvent {
    PostCreated {
        post: Post,
        author_username: String,
    },
    CommentCreated {
        comment: Comment,
        author_username: String,
        post_title: String,
        post_author_id: Uuid,
        /// Author of the comment being replied to
        parent_author_id: Option<Uuid>,
    },
    PostLiked {
        post_id: Uuid,
        post_author_id: Uuid,
        liker_id: Uuid,
    },
    MessageSent {
        message: Message,
        sender_username: String,
    },
    TrophyAwarded {
        user_id: Uuid,
        trophy: Trophy,
        awarded_by: Option<Uuid>,
    },
    Moderation {
        action: ModerationAction,
        /// User affected by the action, when there is one
        subject_user_id: Option<Uuid>,
    },
}

impl ForumEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ForumEvent::PostCreated { .. } => EventKind::PostCreated,
            ForumEvent::CommentCreated { .. } => EventKind::CommentCreated,
            ForumEvent::PostLiked { .. } => EventKind::PostLiked,
            ForumEvent::MessageSent { .. } => EventKind::MessageSent,
            ForumEvent::TrophyAwarded { .. } => EventKind::TrophyAwarded,
            ForumEvent::Moderation { .. } => EventKind::Moderation,
        }
    }

    /// User whose action produced the event; `None` for automatic awards and
    /// command-line moderation
    pub fn actor_id(&self) -> Option<Uuid> {
        match self {
            ForumEvent::PostCreated { post, .. } => Some(post.author_id),
            ForumEvent::CommentCreated { comment, .. } => Some(comment.author_id),
            ForumEvent::PostLiked { liker_id, .. } => Some(*liker_id),
            ForumEvent::MessageSent { message, .. } => Some(message.sender_id),
            ForumEvent::TrophyAwarded { awarded_by, .. } => *awarded_by,
            ForumEvent::Moderation { action, .. } => action.moderator_id,
        }
    }
}
