use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::observer::error::ObserverError;
use crate::observer::event::{EventKind, ForumEvent};
use crate::observer::traits::{EventObserver, ObserverRing};
use crate::services::TrophyLedger;

/// Re-evaluates automatic trophies for whoever's figures an event changed
pub struct TrophyObserver {
    ledger: TrophyLedger,
}

impl TrophyObserver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: TrophyLedger::new(pool),
        }
    }
}

/// User whose post, comment or like count moved
pub fn evaluated_user(event: &ForumEvent) -> Option<Uuid> {
    match event {
        ForumEvent::PostCreated { post, .. } => Some(post.author_id),
        ForumEvent::CommentCreated { comment, .. } => Some(comment.author_id),
        ForumEvent::PostLiked { post_author_id, .. } => Some(*post_author_id),
        _ => None,
    }
}

#[async_trait]
impl EventObserver for TrophyObserver {
    fn name(&self) -> &'static str {
        "trophy_award"
    }

    fn ring(&self) -> ObserverRing {
        ObserverRing::Integration
    }

    fn applies_to(&self, kind: EventKind) -> bool {
        matches!(kind, EventKind::PostCreated | EventKind::CommentCreated | EventKind::PostLiked)
    }

    async fn execute(&self, event: &ForumEvent) -> Result<Vec<ForumEvent>, ObserverError> {
        let Some(user_id) = evaluated_user(event) else {
            return Ok(vec![]);
        };

        let awarded = self.ledger.evaluate(user_id).await?;
        Ok(awarded
            .into_iter()
            .map(|trophy| ForumEvent::TrophyAwarded {
                user_id,
                trophy,
                awarded_by: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn likes_are_credited_to_the_post_author() {
        let author = Uuid::new_v4();
        let event = ForumEvent::PostLiked {
            post_id: Uuid::new_v4(),
            post_author_id: author,
            liker_id: Uuid::new_v4(),
        };
        assert_eq!(evaluated_user(&event), Some(author));
    }
}
