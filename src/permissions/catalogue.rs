// Permissions checked by the API. Seeded by migrations/0002_seed_rbac.sql.

use super::PermissionKey;

pub const POSTS_CREATE: PermissionKey = PermissionKey::from_static("posts", "create");
pub const POSTS_EDIT: PermissionKey = PermissionKey::from_static("posts", "edit");
pub const POSTS_DELETE: PermissionKey = PermissionKey::from_static("posts", "delete");
pub const POSTS_LIKE: PermissionKey = PermissionKey::from_static("posts", "like");

pub const COMMENTS_CREATE: PermissionKey = PermissionKey::from_static("comments", "create");
pub const COMMENTS_EDIT: PermissionKey = PermissionKey::from_static("comments", "edit");
pub const COMMENTS_DELETE: PermissionKey = PermissionKey::from_static("comments", "delete");

pub const MESSAGES_SEND: PermissionKey = PermissionKey::from_static("messages", "send");

pub const REPORTS_CREATE: PermissionKey = PermissionKey::from_static("reports", "create");
pub const REPORTS_VIEW: PermissionKey = PermissionKey::from_static("reports", "view");
pub const REPORTS_RESOLVE: PermissionKey = PermissionKey::from_static("reports", "resolve");

pub const MODERATION_BAN: PermissionKey = PermissionKey::from_static("moderation", "ban");
pub const MODERATION_REMOVE_CONTENT: PermissionKey = PermissionKey::from_static("moderation", "remove_content");
pub const MODERATION_PIN: PermissionKey = PermissionKey::from_static("moderation", "pin");
pub const MODERATION_LOCK: PermissionKey = PermissionKey::from_static("moderation", "lock");
pub const MODERATION_BYPASS_LOCK: PermissionKey = PermissionKey::from_static("moderation", "bypass_lock");
pub const MODERATION_VIEW_LOG: PermissionKey = PermissionKey::from_static("moderation", "view_log");

pub const TROPHIES_MANAGE: PermissionKey = PermissionKey::from_static("trophies", "manage");
pub const TROPHIES_AWARD: PermissionKey = PermissionKey::from_static("trophies", "award");

pub const USERS_VIEW: PermissionKey = PermissionKey::from_static("users", "view");

pub const CATEGORIES_MANAGE: PermissionKey = PermissionKey::from_static("categories", "manage");

pub const ADMIN_MANAGE_ROLES: PermissionKey = PermissionKey::from_static("admin", "manage_roles");
pub const ADMIN_VIEW_STATS: PermissionKey = PermissionKey::from_static("admin", "view_stats");

/// Roles that ship with the schema and cannot be deleted
pub const SYSTEM_ROLES: [&str; 3] = ["admin", "moderator", "member"];
