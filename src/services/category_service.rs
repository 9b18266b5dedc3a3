use serde::Deserialize;
use sqlx::PgPool;

use super::ServiceResult;
use crate::database::models::Category;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::permissions::catalogue::CATEGORIES_MANAGE;
use crate::validation::{self, FieldErrors};

#[derive(Debug, Deserialize)]
pub struct CreateCategory {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub is_locked: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
    pub is_locked: Option<bool>,
}

pub struct CategoryService {
    pool: PgPool,
}

impl CategoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> ServiceResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE deleted_at IS NULL ORDER BY position, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn by_slug(&self, slug: &str) -> ServiceResult<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1 AND deleted_at IS NULL")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Category '{}' not found", slug)))
    }

    pub async fn create(&self, current: &CurrentUser, input: CreateCategory) -> ServiceResult<Category> {
        current.require(&CATEGORIES_MANAGE)?;

        let mut errors = FieldErrors::new();
        errors
            .check("slug", validation::slug(&input.slug))
            .check("name", validation::title(&input.name));
        errors.into_result()?;

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (slug, name, description, position, is_locked)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&input.slug)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.position)
        .bind(input.is_locked)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict(format!("Category '{}' already exists", input.slug)),
            other => other,
        })?;

        tracing::info!("Category '{}' created by {}", category.slug, current.username());
        Ok(category)
    }

    pub async fn update(&self, current: &CurrentUser, slug: &str, input: UpdateCategory) -> ServiceResult<Category> {
        current.require(&CATEGORIES_MANAGE)?;
        if let Some(name) = &input.name {
            validation::title(name).map_err(|msg| ApiError::invalid_field("name", msg))?;
        }

        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                position = COALESCE($4, position),
                is_locked = COALESCE($5, is_locked),
                updated_at = now()
            WHERE slug = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(slug)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.description.as_deref())
        .bind(input.position)
        .bind(input.is_locked)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Category '{}' not found", slug)))
    }

    /// Soft delete; posts in the category stay readable by id
    pub async fn delete(&self, current: &CurrentUser, slug: &str) -> ServiceResult<()> {
        current.require(&CATEGORIES_MANAGE)?;
        let result = sqlx::query("UPDATE categories SET deleted_at = now() WHERE slug = $1 AND deleted_at IS NULL")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Category '{}' not found", slug)));
        }
        tracing::info!("Category '{}' deleted by {}", slug, current.username());
        Ok(())
    }
}
