use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::moderation_service::record_action;
use super::search_service::escape_like;
use super::ServiceResult;
use crate::config;
use crate::database::models::{Category, Post, PostSummary, TargetKind};
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::CurrentUser;
use crate::observer::{ForumEvent, ObserverPipeline};
use crate::permissions::catalogue::{
    MODERATION_BYPASS_LOCK, MODERATION_LOCK, MODERATION_PIN, POSTS_CREATE, POSTS_DELETE, POSTS_EDIT, POSTS_LIKE,
};
use crate::validation::{self, FieldErrors};

/// Optional narrowing for post listings, from the query string
#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub category: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePost {
    pub category_id: Uuid,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LikeState {
    pub post_id: Uuid,
    pub liked: bool,
    pub like_count: i64,
}

/// Owners may edit until the window closes; holders of the unrestricted
/// permission may always edit
pub fn within_edit_window(created_at: DateTime<Utc>, now: DateTime<Utc>, window_minutes: i64) -> bool {
    now - created_at <= Duration::minutes(window_minutes)
}

/// Server-side listing scope built from the query string
pub fn list_scope(query: &PostListQuery) -> Option<Value> {
    let mut scope = Map::new();
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        scope.insert("category_slug".to_string(), json!(category));
    }
    if let Some(author) = query.author.as_deref().filter(|a| !a.is_empty()) {
        scope.insert("author_username".to_string(), json!({ "$ilike": escape_like(author) }));
    }
    if scope.is_empty() {
        None
    } else {
        Some(Value::Object(scope))
    }
}

pub struct PostService {
    pool: PgPool,
    events: Arc<ObserverPipeline>,
}

impl PostService {
    pub fn new(pool: PgPool, events: Arc<ObserverPipeline>) -> Self {
        Self { pool, events }
    }

    /// Pinned posts first, then newest
    pub async fn list(&self, query: &PostListQuery, filter: FilterData) -> ServiceResult<Page<PostSummary>> {
        let page = Repository::<PostSummary>::new("post_summaries", self.pool.clone())
            .page(
                filter,
                list_scope(query),
                "is_pinned desc, created_at desc",
                config::config().api.default_page_size,
            )
            .await?;
        Ok(page)
    }

    /// Fetch a post, counting the view
    pub async fn view(&self, id: Uuid) -> ServiceResult<PostSummary> {
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.summary(id).await
    }

    pub async fn summary(&self, id: Uuid) -> ServiceResult<PostSummary> {
        sqlx::query_as::<_, PostSummary>("SELECT * FROM post_summaries WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Post not found"))
    }

    pub(crate) async fn live_post(&self, id: Uuid) -> ServiceResult<Post> {
        sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Post not found"))
    }

    pub async fn create(&self, current: &CurrentUser, input: CreatePost) -> ServiceResult<Post> {
        current.require(&POSTS_CREATE)?;

        let mut errors = FieldErrors::new();
        errors
            .check("title", validation::title(&input.title))
            .check("body", validation::body(&input.body));
        errors.into_result()?;

        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1 AND deleted_at IS NULL")
            .bind(input.category_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::invalid_field("category_id", "Category does not exist"))?;

        if category.is_locked && !current.can(&MODERATION_BYPASS_LOCK) {
            return Err(ApiError::forbidden(format!("Category '{}' is locked", category.slug)));
        }

        let post = sqlx::query_as::<_, Post>(
            "INSERT INTO posts (category_id, author_id, title, body) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(category.id)
        .bind(current.id())
        .bind(input.title.trim())
        .bind(&input.body)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Post {} created by {} in '{}'", post.id, current.username(), category.slug);
        self.events
            .emit(ForumEvent::PostCreated {
                post: post.clone(),
                author_username: current.username().to_string(),
            })
            .await;
        Ok(post)
    }

    pub async fn update(&self, current: &CurrentUser, id: Uuid, input: UpdatePost) -> ServiceResult<Post> {
        let post = self.live_post(id).await?;
        current.require_enhanced(&POSTS_EDIT, post.author_id)?;

        if !current.can(&POSTS_EDIT) {
            let window = config::config().forum.edit_window_minutes;
            if !within_edit_window(post.created_at, Utc::now(), window) {
                return Err(ApiError::forbidden(format!(
                    "Posts can only be edited within {} minutes of posting",
                    window
                )));
            }
            if post.is_locked && !current.can(&MODERATION_BYPASS_LOCK) {
                return Err(ApiError::forbidden("Post is locked"));
            }
        }

        let mut errors = FieldErrors::new();
        if let Some(title) = &input.title {
            errors.check("title", validation::title(title));
        }
        if let Some(body) = &input.body {
            errors.check("body", validation::body(body));
        }
        errors.into_result()?;

        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts SET title = COALESCE($2, title), body = COALESCE($3, body), updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.title.as_deref().map(str::trim))
        .bind(input.body.as_deref())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Post {} edited by {}", post.id, current.username());
        Ok(post)
    }

    pub async fn delete(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<()> {
        let post = self.live_post(id).await?;
        current.require_enhanced(&POSTS_DELETE, post.author_id)?;

        sqlx::query("UPDATE posts SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Post {} deleted by {}", id, current.username());
        Ok(())
    }

    pub async fn set_pinned(&self, current: &CurrentUser, id: Uuid, pinned: bool) -> ServiceResult<Post> {
        current.require(&MODERATION_PIN)?;
        self.set_flag(current, id, "is_pinned", pinned, if pinned { "pin" } else { "unpin" }).await
    }

    pub async fn set_locked(&self, current: &CurrentUser, id: Uuid, locked: bool) -> ServiceResult<Post> {
        current.require(&MODERATION_LOCK)?;
        self.set_flag(current, id, "is_locked", locked, if locked { "lock" } else { "unlock" }).await
    }

    async fn set_flag(&self, current: &CurrentUser, id: Uuid, column: &'static str, value: bool, action: &str) -> ServiceResult<Post> {
        let mut tx = self.pool.begin().await?;
        let post = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET {} = $2, updated_at = now() WHERE id = $1 AND deleted_at IS NULL RETURNING *",
            column
        ))
        .bind(id)
        .bind(value)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

        let audit = record_action(&mut tx, Some(current.id()), action, TargetKind::Post, id, "").await?;
        tx.commit().await?;

        tracing::info!("Post {} {} by {}", id, action, current.username());
        self.events
            .emit(ForumEvent::Moderation {
                action: audit,
                subject_user_id: None,
            })
            .await;
        Ok(post)
    }

    /// Idempotent. Authors cannot like their own posts.
    pub async fn like(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<LikeState> {
        current.require(&POSTS_LIKE)?;
        let post = self.live_post(id).await?;
        if post.author_id == current.id() {
            return Err(ApiError::bad_request("You cannot like your own post"));
        }

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(id)
            .bind(current.id())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;
        let like_count = if inserted {
            sqlx::query_scalar::<_, i64>("UPDATE posts SET like_count = like_count + 1 WHERE id = $1 RETURNING like_count")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
        } else {
            post.like_count
        };
        tx.commit().await?;

        if inserted {
            self.events
                .emit(ForumEvent::PostLiked {
                    post_id: id,
                    post_author_id: post.author_id,
                    liker_id: current.id(),
                })
                .await;
        }
        Ok(LikeState {
            post_id: id,
            liked: true,
            like_count,
        })
    }

    pub async fn unlike(&self, current: &CurrentUser, id: Uuid) -> ServiceResult<LikeState> {
        current.require(&POSTS_LIKE)?;
        let post = self.live_post(id).await?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(id)
            .bind(current.id())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;
        let like_count = if removed {
            sqlx::query_scalar::<_, i64>(
                "UPDATE posts SET like_count = GREATEST(like_count - 1, 0) WHERE id = $1 RETURNING like_count",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            post.like_count
        };
        tx.commit().await?;

        Ok(LikeState {
            post_id: id,
            liked: false,
            like_count,
        })
    }
}
