use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::catalogue::SYSTEM_ROLES;
use super::{EffectivePermissions, PermissionKey};
use crate::database::models::{PermissionRow, Role, RoleGrant, User};
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

/// Role, permission and assignment queries
#[derive(Clone)]
pub struct PermissionStore {
    pool: PgPool,
}

impl PermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve a user's effective permissions straight from the join tables
    pub async fn load_effective(&self, user: &User) -> Result<EffectivePermissions, ApiError> {
        let primary = match user.primary_role_id {
            Some(role_id) => sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await?,
            None => None,
        };

        let secondary = sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = $1",
        )
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;

        let role_ids: Vec<Uuid> = primary.iter().chain(secondary.iter()).map(|r| r.id).collect();
        let grants = if role_ids.is_empty() {
            vec![]
        } else {
            sqlx::query_as::<_, RoleGrant>(
                r#"
                SELECT rp.role_id, p.category, p.action
                FROM role_permissions rp
                JOIN permissions p ON p.id = rp.permission_id
                WHERE rp.role_id = ANY($1)
                "#,
            )
            .bind(&role_ids)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(EffectivePermissions::resolve(
            user.id,
            user.is_banned(),
            primary.as_ref(),
            &secondary,
            &grants,
        ))
    }

    pub async fn role_by_name(&self, name: &str) -> Result<Role, ApiError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Role '{}' not found", name)))
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleWithPermissions>, ApiError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY priority DESC, name")
            .fetch_all(&self.pool)
            .await?;
        let grants = sqlx::query_as::<_, RoleGrant>(
            "SELECT rp.role_id, p.category, p.action FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id ORDER BY p.category, p.action",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(roles
            .into_iter()
            .map(|role| {
                let permissions = grants
                    .iter()
                    .filter(|g| g.role_id == role.id)
                    .map(|g| format!("{}.{}", g.category, g.action))
                    .collect();
                RoleWithPermissions { role, permissions }
            })
            .collect())
    }

    pub async fn create_role(&self, name: &str, description: &str, priority: i32) -> Result<Role, ApiError> {
        crate::validation::validate_slug("name", name)?;
        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (name, description, priority) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(name)
        .bind(description)
        .bind(priority)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!("Created role '{}'", role.name);
        Ok(role)
    }

    pub async fn delete_role(&self, name: &str) -> Result<(), ApiError> {
        let role = self.role_by_name(name).await?;
        if role.is_system || SYSTEM_ROLES.contains(&role.name.as_str()) {
            return Err(ApiError::conflict(format!("System role '{}' cannot be deleted", name)));
        }
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Deleted role '{}'", name);
        Ok(())
    }

    async fn permission_id(&self, key: &PermissionKey) -> Result<Uuid, ApiError> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM permissions WHERE category = $1 AND action = $2")
            .bind(key.category())
            .bind(key.action())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Permission '{}' not found", key)))
    }

    /// Idempotent
    pub async fn grant(&self, role_name: &str, key: &PermissionKey) -> Result<(), ApiError> {
        let role = self.role_by_name(role_name).await?;
        let permission_id = self.permission_id(key).await?;
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role.id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;
        tracing::info!("Granted '{}' to role '{}'", key, role_name);
        Ok(())
    }

    /// Idempotent
    pub async fn revoke(&self, role_name: &str, key: &PermissionKey) -> Result<(), ApiError> {
        let role = self.role_by_name(role_name).await?;
        let permission_id = self.permission_id(key).await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
            .bind(role.id)
            .bind(permission_id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Revoked '{}' from role '{}'", key, role_name);
        Ok(())
    }

    pub async fn list_permissions(&self) -> Result<Vec<PermissionRow>, ApiError> {
        let rows = sqlx::query_as::<_, PermissionRow>("SELECT * FROM permissions ORDER BY category, action")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Duplicate `(category, action)` pairs surface as 409
    pub async fn create_permission(&self, key: &PermissionKey, description: &str) -> Result<PermissionRow, ApiError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "INSERT INTO permissions (category, action, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(key.category())
        .bind(key.action())
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict(format!("Permission '{}' already exists", key)),
            other => other,
        })?;
        Ok(row)
    }

    pub async fn set_primary_role(&self, user_id: Uuid, role_name: &str) -> Result<Role, ApiError> {
        let role = self.role_by_name(role_name).await?;
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE users SET primary_role_id = $1, updated_at = now() WHERE id = $2 AND deleted_at IS NULL")
            .bind(role.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(ApiError::not_found("User not found"));
        }
        // Keep the secondary set disjoint from the primary role
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!("User {} primary role set to '{}'", user_id, role_name);
        Ok(role)
    }

    /// Adding the user's primary role is a no-op. Unknown or deleted users are 404.
    pub async fn add_secondary_role(&self, user_id: Uuid, role_name: &str) -> Result<Role, ApiError> {
        let role = self.role_by_name(role_name).await?;
        let user_exists = sqlx::query_scalar::<_, bool>(
            r#"
            WITH target AS (
                SELECT id, primary_role_id FROM users WHERE id = $1 AND deleted_at IS NULL
            ), granted AS (
                INSERT INTO user_roles (user_id, role_id)
                SELECT t.id, $2 FROM target t
                WHERE t.primary_role_id IS DISTINCT FROM $2
                ON CONFLICT DO NOTHING
            )
            SELECT EXISTS (SELECT 1 FROM target)
            "#,
        )
        .bind(user_id)
        .bind(role.id)
        .fetch_one(&self.pool)
        .await?;
        if !user_exists {
            return Err(ApiError::not_found("User not found"));
        }
        Ok(role)
    }

    pub async fn remove_secondary_role(&self, user_id: Uuid, role_name: &str) -> Result<(), ApiError> {
        let role = self.role_by_name(role_name).await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
