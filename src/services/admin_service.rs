use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::trophy_service::{TrophyLedger, UserStats};
use super::{user_by_username, ServiceResult, TrophyService};
use crate::config;
use crate::database::models::{AwardedTrophy, PermissionRow, PublicProfile, Role, User};
use crate::database::{Page, Repository};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::CurrentUser;
use crate::observer::ObserverPipeline;
use crate::permissions::catalogue::{ADMIN_MANAGE_ROLES, ADMIN_VIEW_STATS, USERS_VIEW};
use crate::permissions::store::RoleWithPermissions;
use crate::permissions::{EffectivePermissions, PermissionKey, PermissionStore};

#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: PublicProfile,
    pub stats: UserStats,
    pub trophies: Vec<AwardedTrophy>,
}

#[derive(Debug, Deserialize)]
pub struct SetPrimaryRole {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct SetSecondaryRoles {
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    /// `category.action`
    pub permission: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Serialize, FromRow)]
pub struct SiteStats {
    pub users: i64,
    pub banned_users: i64,
    pub posts: i64,
    pub comments: i64,
    pub open_reports: i64,
    pub messages: i64,
}

/// Secondary roles to add and to remove so the user ends up with `wanted`.
/// The primary role never appears in the secondary set.
pub fn role_changes(current: &[String], wanted: &[String], primary: Option<&str>) -> (Vec<String>, Vec<String>) {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let wanted: BTreeSet<&str> = wanted
        .iter()
        .map(String::as_str)
        .filter(|r| Some(*r) != primary)
        .collect();

    let add = wanted.difference(&current).map(|r| r.to_string()).collect();
    let remove = current.difference(&wanted).map(|r| r.to_string()).collect();
    (add, remove)
}

pub struct AdminService {
    pool: PgPool,
    store: PermissionStore,
    trophies: TrophyService,
}

impl AdminService {
    pub fn new(pool: PgPool, events: Arc<ObserverPipeline>) -> Self {
        Self {
            store: PermissionStore::new(pool.clone()),
            trophies: TrophyService::new(pool.clone(), events),
            pool,
        }
    }

    /// Full user rows including email and ban state. Deleted accounts are listed
    /// only on request, and only to holders of `admin.manage_roles`.
    pub async fn list_users(&self, current: &CurrentUser, filter: FilterData, include_deleted: bool) -> ServiceResult<Page<User>> {
        current.require(&USERS_VIEW)?;
        if include_deleted {
            current.require(&ADMIN_MANAGE_ROLES)?;
        }
        let page = Repository::<User>::new("users", self.pool.clone())
            .hide_columns(&["password_hash"])
            .include_deleted(include_deleted)
            .page(filter, None, "created_at desc", config::config().api.default_page_size)
            .await?;
        Ok(page)
    }

    /// Public profile with activity figures and trophies
    pub async fn profile(&self, username: &str) -> ServiceResult<ProfileView> {
        let user = user_by_username(&self.pool, username).await?;
        let stats = TrophyLedger::new(self.pool.clone()).stats_for(user.id).await?;
        let trophies = self.trophies.for_user(&user.username).await?;
        Ok(ProfileView {
            profile: user.public_profile(),
            stats,
            trophies,
        })
    }

    /// Effective roles and permissions of any user
    pub async fn access_of(&self, current: &CurrentUser, username: &str) -> ServiceResult<EffectivePermissions> {
        current.require(&USERS_VIEW)?;
        let user = user_by_username(&self.pool, username).await?;
        self.store.load_effective(&user).await
    }

    pub async fn set_primary_role(&self, current: &CurrentUser, username: &str, role: &str) -> ServiceResult<EffectivePermissions> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        self.apply_primary_role(username, role).await
    }

    /// Role assignment without a permission check, for the command line
    pub async fn apply_primary_role(&self, username: &str, role: &str) -> ServiceResult<EffectivePermissions> {
        let user = user_by_username(&self.pool, username).await?;
        self.store.set_primary_role(user.id, role).await?;
        let user = super::user_by_id(&self.pool, user.id).await?;
        self.store.load_effective(&user).await
    }

    /// Replace the user's secondary roles with `roles`
    pub async fn set_secondary_roles(
        &self,
        current: &CurrentUser,
        username: &str,
        roles: &[String],
    ) -> ServiceResult<EffectivePermissions> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        let user = user_by_username(&self.pool, username).await?;

        // Unknown role names fail before anything changes
        for role in roles {
            self.store.role_by_name(role).await?;
        }

        let access = self.store.load_effective(&user).await?;
        let held: Vec<String> = access.secondary_roles.iter().map(|r| r.name.clone()).collect();
        let primary = access.primary_role.as_ref().map(|r| r.name.as_str());
        let (add, remove) = role_changes(&held, roles, primary);

        for role in &add {
            self.store.add_secondary_role(user.id, role).await?;
        }
        for role in &remove {
            self.store.remove_secondary_role(user.id, role).await?;
        }
        tracing::info!(
            "Secondary roles of {} changed by {}: +{:?} -{:?}",
            user.username,
            current.username(),
            add,
            remove
        );
        self.store.load_effective(&user).await
    }

    pub async fn list_roles(&self, current: &CurrentUser) -> ServiceResult<Vec<RoleWithPermissions>> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        self.store.list_roles().await
    }

    pub async fn create_role(&self, current: &CurrentUser, input: CreateRole) -> ServiceResult<Role> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        self.store
            .create_role(&input.name, &input.description, input.priority)
            .await
            .map_err(|e| match e {
                ApiError::Conflict(_) => ApiError::conflict(format!("Role '{}' already exists", input.name)),
                other => other,
            })
    }

    pub async fn delete_role(&self, current: &CurrentUser, name: &str) -> ServiceResult<()> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        self.store.delete_role(name).await
    }

    pub async fn grant(&self, current: &CurrentUser, role: &str, permission: &str) -> ServiceResult<()> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        let key: PermissionKey = permission.parse()?;
        self.store.grant(role, &key).await
    }

    pub async fn revoke(&self, current: &CurrentUser, role: &str, permission: &str) -> ServiceResult<()> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        let key: PermissionKey = permission.parse()?;
        self.store.revoke(role, &key).await
    }

    pub async fn list_permissions(&self, current: &CurrentUser) -> ServiceResult<Vec<PermissionRow>> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        self.store.list_permissions().await
    }

    pub async fn create_permission(&self, current: &CurrentUser, input: PermissionRequest) -> ServiceResult<PermissionRow> {
        current.require(&ADMIN_MANAGE_ROLES)?;
        let key: PermissionKey = input.permission.parse()?;
        self.store.create_permission(&key, &input.description).await
    }

    pub async fn stats(&self, current: &CurrentUser) -> ServiceResult<SiteStats> {
        current.require(&ADMIN_VIEW_STATS)?;
        let stats = sqlx::query_as::<_, SiteStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE deleted_at IS NULL) AS users,
                (SELECT COUNT(*) FROM users
                    WHERE deleted_at IS NULL AND banned_at IS NOT NULL
                    AND (banned_until IS NULL OR banned_until > now())) AS banned_users,
                (SELECT COUNT(*) FROM posts WHERE deleted_at IS NULL) AS posts,
                (SELECT COUNT(*) FROM comments WHERE deleted_at IS NULL) AS comments,
                (SELECT COUNT(*) FROM reports WHERE status = 'open') AS open_reports,
                (SELECT COUNT(*) FROM messages) AS messages
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn computes_role_diff() {
        let (add, remove) = role_changes(&names(&["moderator", "beta"]), &names(&["moderator", "support"]), Some("member"));
        assert_eq!(add, names(&["support"]));
        assert_eq!(remove, names(&["beta"]));
    }

    #[test]
    fn primary_role_never_added_as_secondary() {
        let (add, remove) = role_changes(&[], &names(&["member", "moderator"]), Some("member"));
        assert_eq!(add, names(&["moderator"]));
        assert!(remove.is_empty());
    }

    #[test]
    fn empty_wanted_removes_everything() {
        let (add, remove) = role_changes(&names(&["moderator"]), &[], None);
        assert!(add.is_empty());
        assert_eq!(remove, names(&["moderator"]));
    }
}
