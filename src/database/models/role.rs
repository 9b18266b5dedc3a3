use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PermissionRow {
    pub id: Uuid,
    pub category: String,
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// One (role, permission) edge of the role_permissions join
#[derive(Debug, Clone, FromRow)]
pub struct RoleGrant {
    pub role_id: Uuid,
    pub category: String,
    pub action: String,
}
