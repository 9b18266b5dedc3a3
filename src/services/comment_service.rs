use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ServiceResult;
use crate::database::models::comment::DELETED_COMMENT_BODY;
use crate::database::models::{Comment, CommentSummary, Post};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::observer::{ForumEvent, ObserverPipeline};
use crate::permissions::catalogue::{COMMENTS_CREATE, COMMENTS_DELETE, COMMENTS_EDIT, MODERATION_BYPASS_LOCK};
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct CreateComment {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateComment {
    pub body: String,
}

/// A comment with its replies, oldest first at every level
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentSummary,
    pub deleted: bool,
    pub replies: Vec<CommentNode>,
}

/// Replies nest at most this deep; anything below is listed flat under the
/// comment at the last level, oldest first.
pub const MAX_THREAD_DEPTH: usize = 32;

/// Build reply trees from a flat list.
///
/// Deleted comments that still have live replies stay in the tree with their
/// body replaced; deleted leaves are dropped. Comments whose parent is not in
/// the list are treated as top-level.
pub fn thread(mut comments: Vec<CommentSummary>) -> Vec<CommentNode> {
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let ids: std::collections::HashSet<Uuid> = comments.iter().map(|c| c.id).collect();
    let mut children: HashMap<Option<Uuid>, Vec<CommentSummary>> = HashMap::new();
    for comment in comments {
        let parent = comment.parent_id.filter(|p| ids.contains(p));
        children.entry(parent).or_default().push(comment);
    }

    build(None, &mut children, 1)
}

fn build(parent: Option<Uuid>, children: &mut HashMap<Option<Uuid>, Vec<CommentSummary>>, depth: usize) -> Vec<CommentNode> {
    let Some(level) = children.remove(&parent) else {
        return vec![];
    };

    level
        .into_iter()
        .filter_map(|mut comment| {
            let replies = if depth < MAX_THREAD_DEPTH {
                build(Some(comment.id), children, depth + 1)
            } else {
                flatten(comment.id, children)
            };
            let deleted = comment.deleted_at.is_some();
            if deleted {
                if replies.is_empty() {
                    return None;
                }
                comment.body = DELETED_COMMENT_BODY.to_string();
            }
            Some(CommentNode {
                comment,
                deleted,
                replies,
            })
        })
        .collect()
}

/// Every live descendant of `root` as a leaf, in posting order
fn flatten(root: Uuid, children: &mut HashMap<Option<Uuid>, Vec<CommentSummary>>) -> Vec<CommentNode> {
    let mut pending = vec![root];
    let mut found = Vec::new();
    while let Some(id) = pending.pop() {
        for comment in children.remove(&Some(id)).unwrap_or_default() {
            pending.push(comment.id);
            found.push(comment);
        }
    }
    found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    found
        .into_iter()
        .filter(|c| c.deleted_at.is_none())
        .map(|comment| CommentNode {
            comment,
            deleted: false,
            replies: vec![],
        })
        .collect()
}

pub struct CommentService {
    pool: PgPool,
    events: Arc<ObserverPipeline>,
}

impl CommentService {
    pub fn new(pool: PgPool, events: Arc<ObserverPipeline>) -> Self {
        Self { pool, events }
    }

    /// Threaded comments of a live post
    pub async fn list_for_post(&self, post_id: Uuid) -> ServiceResult<Vec<CommentNode>> {
        self.live_post(post_id).await?;
        let comments = sqlx::query_as::<_, CommentSummary>(
            "SELECT * FROM comment_summaries WHERE post_id = $1 ORDER BY created_at, id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(thread(comments))
    }

    pub async fn create(&self, current: &CurrentUser, post_id: Uuid, input: CreateComment) -> ServiceResult<Comment> {
        current.require(&COMMENTS_CREATE)?;
        validation::body(&input.body).map_err(|msg| ApiError::invalid_field("body", msg))?;

        let post = self.live_post(post_id).await?;
        if post.is_locked && !current.can(&MODERATION_BYPASS_LOCK) {
            return Err(ApiError::forbidden("Post is locked"));
        }

        let parent_author_id = match input.parent_id {
            Some(parent_id) => {
                let parent = self.live_comment(parent_id).await.map_err(|_| {
                    ApiError::invalid_field("parent_id", "Parent comment does not exist")
                })?;
                if parent.post_id != post_id {
                    return Err(ApiError::invalid_field("parent_id", "Parent comment belongs to another post"));
                }
                Some(parent.author_id)
            }
            None => None,
        };

        let comment = sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (post_id, author_id, parent_id, body) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(post_id)
        .bind(current.id())
        .bind(input.parent_id)
        .bind(&input.body)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Comment {} on post {} by {}", comment.id, post_id, current.username());
        self.events
            .emit(ForumEvent::CommentCreated {
                comment: comment.clone(),
                author_username: current.username().to_string(),
                post_title: post.title,
                post_author_id: post.author_id,
                parent_author_id,
            })
            .await;
        Ok(comment)
    }

    pub async fn update(&self, current: &CurrentUser, id: Uuid, input: UpdateComment) -> ServiceResult<Comment> {
        let comment = self.live_comment(id).await?;
        current.require_enhanced(&COMMENTS_EDIT, comment.author_id)?;
        validation::body(&input.body).map_err(|msg| ApiError::invalid_field("body", msg))?;

        let comment = sqlx::query_as::<_, Comment>(
            "UPDATE comments SET body = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&input.body)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    /// Soft delete; replies keep their place under a tombstone
    pub async fn delete(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<()> {
        let comment = self.live_comment(id).await?;
        current.require_enhanced(&COMMENTS_DELETE, comment.author_id)?;

        sqlx::query("UPDATE comments SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Comment {} deleted by {}", id, current.username());
        Ok(())
    }

    async fn live_post(&self, id: Uuid) -> ServiceResult<Post> {
        sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Post not found"))
    }

    async fn live_comment(&self, id: Uuid) -> ServiceResult<Comment> {
        sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Comment not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn comment(id: u128, parent: Option<u128>, minute: i64) -> CommentSummary {
        let at = Utc::now() + Duration::minutes(minute);
        CommentSummary {
            id: Uuid::from_u128(id),
            post_id: Uuid::from_u128(999),
            author_id: Uuid::from_u128(500),
            parent_id: parent.map(Uuid::from_u128),
            body: format!("comment {}", id),
            created_at: at,
            updated_at: at,
            deleted_at: None,
            author_username: "alice".to_string(),
        }
    }

    #[test]
    fn builds_nested_threads_in_order() {
        let tree = thread(vec![comment(3, Some(1), 3), comment(2, None, 2), comment(1, None, 1), comment(4, Some(3), 4)]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].comment.id, Uuid::from_u128(1));
        assert_eq!(tree[1].comment.id, Uuid::from_u128(2));
        assert_eq!(tree[0].replies[0].comment.id, Uuid::from_u128(3));
        assert_eq!(tree[0].replies[0].replies[0].comment.id, Uuid::from_u128(4));
    }

    #[test]
    fn deleted_parent_with_replies_becomes_tombstone() {
        let mut parent = comment(1, None, 1);
        parent.deleted_at = Some(Utc::now());
        let tree = thread(vec![parent, comment(2, Some(1), 2)]);

        assert_eq!(tree.len(), 1);
        assert!(tree[0].deleted);
        assert_eq!(tree[0].comment.body, DELETED_COMMENT_BODY);
        assert_eq!(tree[0].replies.len(), 1);
    }

    #[test]
    fn deleted_leaves_are_dropped() {
        let mut leaf = comment(2, Some(1), 2);
        leaf.deleted_at = Some(Utc::now());
        let tree = thread(vec![comment(1, None, 1), leaf]);

        assert_eq!(tree.len(), 1);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn orphans_surface_at_top_level() {
        let tree = thread(vec![comment(2, Some(77), 1)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].comment.id, Uuid::from_u128(2));
    }

    fn depth(nodes: &[CommentNode]) -> usize {
        let mut deepest = 0;
        let mut pending: Vec<(&CommentNode, usize)> = nodes.iter().map(|n| (n, 1)).collect();
        while let Some((node, level)) = pending.pop() {
            deepest = deepest.max(level);
            pending.extend(node.replies.iter().map(|r| (r, level + 1)));
        }
        deepest
    }

    fn count(nodes: &[CommentNode]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.replies)).sum()
    }

    #[test]
    fn long_reply_chains_are_capped() {
        let chain: Vec<_> = (1..=10_000u128)
            .map(|id| comment(id, if id == 1 { None } else { Some(id - 1) }, id as i64))
            .collect();
        let tree = thread(chain);

        assert_eq!(depth(&tree), MAX_THREAD_DEPTH + 1);
        assert_eq!(count(&tree), 10_000);

        let mut last = &tree[0];
        while last.replies.len() == 1 {
            last = &last.replies[0];
        }
        let flat = &last.replies;
        assert_eq!(flat.len(), 10_000 - MAX_THREAD_DEPTH);
        assert!(flat.windows(2).all(|w| w[0].comment.created_at <= w[1].comment.created_at));
        assert!(serde_json::to_string(&tree).is_ok());
    }
}
