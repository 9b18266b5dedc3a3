use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trophy {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub criteria_kind: String,
    pub threshold: i64,
    pub created_at: DateTime<Utc>,
}

/// A trophy as held by a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AwardedTrophy {
    pub trophy_id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub awarded_by: Option<Uuid>,
    pub awarded_at: DateTime<Utc>,
}
