//! Role-based access control.
//!
//! A user's effective permissions are the union of the permissions granted
//! to their primary role and to each of their secondary roles. Checks are a
//! plain set-membership test; there is no role hierarchy and nothing is
//! cached between requests.

use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::database::models::{Role, RoleGrant};
use crate::error::ApiError;

pub mod catalogue;
pub mod store;

pub use store::PermissionStore;

/// Suffix of the permission that grants an action on one's own resources
pub const OWN_SUFFIX: &str = "_own";

/// A `category.action` permission string, unique per category
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionKey {
    category: Cow<'static, str>,
    action: Cow<'static, str>,
}

impl PermissionKey {
    pub const fn from_static(category: &'static str, action: &'static str) -> Self {
        Self {
            category: Cow::Borrowed(category),
            action: Cow::Borrowed(action),
        }
    }

    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Result<Self, ApiError> {
        let category = category.into();
        let action = action.into();
        for (field, part) in [("category", &category), ("action", &action)] {
            if !is_valid_part(part) {
                return Err(ApiError::invalid_field(
                    field,
                    format!("'{}' must be lowercase letters, digits or underscores", part),
                ));
            }
        }
        Ok(Self {
            category: Cow::Owned(category),
            action: Cow::Owned(action),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_own_variant(&self) -> bool {
        self.action.ends_with(OWN_SUFFIX)
    }

    /// `posts.edit` -> `posts.edit_own`
    pub fn own_variant(&self) -> PermissionKey {
        PermissionKey {
            category: self.category.clone(),
            action: Cow::Owned(format!("{}{}", self.action, OWN_SUFFIX)),
        }
    }
}

fn is_valid_part(part: &str) -> bool {
    !part.is_empty()
        && part.len() <= 64
        && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.action)
    }
}

impl FromStr for PermissionKey {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, action) = s
            .split_once('.')
            .ok_or_else(|| ApiError::invalid_field("permission", format!("'{}' is not of the form category.action", s)))?;
        PermissionKey::new(category, action)
    }
}

impl Serialize for PermissionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Who owns the resource an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned(Uuid),
    Unowned,
}

impl Ownership {
    pub fn of(owner_id: Uuid) -> Self {
        Ownership::Owned(owner_id)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        matches!(self, Ownership::Owned(owner) if *owner == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub id: Uuid,
    pub name: String,
    pub priority: i32,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            priority: role.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub primary_role: Option<RoleSummary>,
    pub secondary_roles: Vec<RoleSummary>,
    pub permissions: BTreeSet<PermissionKey>,
    pub banned: bool,
}

impl EffectivePermissions {
    /// Union the grants of the primary role and every secondary role.
    /// A secondary role equal to the primary role is dropped.
    pub fn resolve(
        user_id: Uuid,
        banned: bool,
        primary: Option<&Role>,
        secondary: &[Role],
        grants: &[RoleGrant],
    ) -> Self {
        let primary_id = primary.map(|r| r.id);
        let mut seen = HashSet::new();
        let mut secondary_roles: Vec<RoleSummary> = secondary
            .iter()
            .filter(|r| Some(r.id) != primary_id && seen.insert(r.id))
            .map(RoleSummary::from)
            .collect();
        secondary_roles.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));

        let role_ids: HashSet<Uuid> = primary_id
            .into_iter()
            .chain(secondary_roles.iter().map(|r| r.id))
            .collect();

        let permissions = grants
            .iter()
            .filter(|g| role_ids.contains(&g.role_id))
            .filter_map(|g| PermissionKey::new(g.category.clone(), g.action.clone()).ok())
            .collect();

        Self {
            user_id,
            primary_role: primary.map(RoleSummary::from),
            secondary_roles,
            permissions,
            banned,
        }
    }

    /// Anonymous visitors hold nothing
    pub fn anonymous() -> Self {
        Self {
            user_id: Uuid::nil(),
            primary_role: None,
            secondary_roles: vec![],
            permissions: BTreeSet::new(),
            banned: false,
        }
    }

    pub fn has_permission(&self, permission: &PermissionKey) -> bool {
        !self.banned && self.permissions.contains(permission)
    }

    /// Either the unrestricted permission, or the `_own` variant on a
    /// resource this user owns.
    pub fn has_enhanced_permission(&self, permission: &PermissionKey, ownership: Ownership) -> bool {
        if self.has_permission(permission) {
            return true;
        }
        ownership.is_owned_by(self.user_id) && self.has_permission(&permission.own_variant())
    }

    pub fn require(&self, permission: &PermissionKey) -> Result<(), ApiError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(self.denied(permission))
        }
    }

    pub fn require_enhanced(&self, permission: &PermissionKey, ownership: Ownership) -> Result<(), ApiError> {
        if self.has_enhanced_permission(permission, ownership) {
            Ok(())
        } else {
            Err(self.denied(permission))
        }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.primary_role.iter().chain(self.secondary_roles.iter()).any(|r| r.name == name)
    }

    fn denied(&self, permission: &PermissionKey) -> ApiError {
        tracing::warn!("Permission '{}' denied for user {}", permission, self.user_id);
        if self.banned {
            ApiError::forbidden("Your account is banned")
        } else {
            ApiError::forbidden(format!("Missing permission '{}'", permission))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::catalogue::*;
    use super::*;
    use chrono::Utc;

    fn role(name: &str, priority: i32) -> Role {
        Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            priority,
            is_system: true,
            created_at: Utc::now(),
        }
    }

    fn grant(role: &Role, key: &str) -> RoleGrant {
        let (category, action) = key.split_once('.').unwrap();
        RoleGrant {
            role_id: role.id,
            category: category.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn parses_and_displays_keys() {
        let key: PermissionKey = "posts.edit_own".parse().unwrap();
        assert_eq!(key.category(), "posts");
        assert_eq!(key.action(), "edit_own");
        assert!(key.is_own_variant());
        assert_eq!(key.to_string(), "posts.edit_own");
        assert_eq!(POSTS_EDIT.own_variant(), key);

        assert!("posts".parse::<PermissionKey>().is_err());
        assert!("Posts.Edit".parse::<PermissionKey>().is_err());
        assert!("posts.".parse::<PermissionKey>().is_err());
        assert!("posts.edit.now".parse::<PermissionKey>().is_err());
    }

    #[test]
    fn static_and_parsed_keys_are_equal() {
        let parsed: PermissionKey = "posts.create".parse().unwrap();
        assert_eq!(parsed, POSTS_CREATE);
        let set: BTreeSet<PermissionKey> = [parsed].into_iter().collect();
        assert!(set.contains(&POSTS_CREATE));
    }

    #[test]
    fn union_of_primary_and_secondary_roles() {
        let member = role("member", 10);
        let moderator = role("moderator", 50);
        let admin = role("admin", 100);
        let grants = vec![
            grant(&member, "posts.create"),
            grant(&moderator, "moderation.ban"),
            grant(&admin, "admin.manage_roles"),
        ];

        let user = Uuid::new_v4();
        let perms = EffectivePermissions::resolve(user, false, Some(&member), &[moderator.clone()], &grants);

        assert!(perms.has_permission(&POSTS_CREATE));
        assert!(perms.has_permission(&MODERATION_BAN));
        assert!(!perms.has_permission(&ADMIN_MANAGE_ROLES));
        assert!(perms.has_role("moderator"));
        assert!(!perms.has_role("admin"));
    }

    #[test]
    fn secondary_duplicate_of_primary_is_dropped() {
        let member = role("member", 10);
        let perms = EffectivePermissions::resolve(Uuid::new_v4(), false, Some(&member), &[member.clone(), member.clone()], &[]);
        assert!(perms.secondary_roles.is_empty());
    }

    #[test]
    fn no_roles_means_no_permissions() {
        let stranger = role("other", 1);
        let grants = vec![grant(&stranger, "posts.create")];
        let perms = EffectivePermissions::resolve(Uuid::new_v4(), false, None, &[], &grants);
        assert!(perms.permissions.is_empty());
        assert!(!perms.has_permission(&POSTS_CREATE));
    }

    #[test]
    fn banned_users_hold_nothing() {
        let member = role("member", 10);
        let grants = vec![grant(&member, "posts.create")];
        let perms = EffectivePermissions::resolve(Uuid::new_v4(), true, Some(&member), &[], &grants);
        assert!(!perms.has_permission(&POSTS_CREATE));
        let err = perms.require(&POSTS_CREATE).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "Your account is banned");
    }

    #[test]
    fn enhanced_permission_respects_ownership() {
        let member = role("member", 10);
        let grants = vec![grant(&member, "posts.edit_own")];
        let user = Uuid::new_v4();
        let perms = EffectivePermissions::resolve(user, false, Some(&member), &[], &grants);

        assert!(perms.has_enhanced_permission(&POSTS_EDIT, Ownership::of(user)));
        assert!(!perms.has_enhanced_permission(&POSTS_EDIT, Ownership::of(Uuid::new_v4())));
        assert!(!perms.has_enhanced_permission(&POSTS_EDIT, Ownership::Unowned));
        assert!(!perms.has_permission(&POSTS_EDIT));
    }

    #[test]
    fn unrestricted_permission_covers_foreign_resources() {
        let moderator = role("moderator", 50);
        let grants = vec![grant(&moderator, "posts.edit")];
        let perms = EffectivePermissions::resolve(Uuid::new_v4(), false, Some(&moderator), &[], &grants);
        assert!(perms.has_enhanced_permission(&POSTS_EDIT, Ownership::of(Uuid::new_v4())));
    }

    #[test]
    fn require_names_missing_permission() {
        let perms = EffectivePermissions::anonymous();
        let err = perms.require_enhanced(&COMMENTS_DELETE, Ownership::Unowned).unwrap_err();
        assert_eq!(err.message(), "Missing permission 'comments.delete'");
    }

    #[test]
    fn serializes_permissions_as_strings() {
        let member = role("member", 10);
        let grants = vec![grant(&member, "posts.like"), grant(&member, "comments.create")];
        let perms = EffectivePermissions::resolve(Uuid::new_v4(), false, Some(&member), &[], &grants);
        let value = serde_json::to_value(&perms).unwrap();
        assert_eq!(value["permissions"], serde_json::json!(["comments.create", "posts.like"]));
        assert_eq!(value["primary_role"]["name"], "member");
    }
}
