use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: String,
    pub primary_role_id: Option<Uuid>,
    pub banned_at: Option<DateTime<Utc>>,
    pub banned_until: Option<DateTime<Utc>>,
    pub ban_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// A ban is active when it was issued and has not yet expired
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        match (self.banned_at, self.banned_until) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(until)) => until > now,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.is_banned_at(Utc::now())
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            bio: self.bio.clone(),
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
            banned: self.is_banned(),
        }
    }
}

/// What any visitor may see about a user
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub banned: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            display_name: None,
            bio: String::new(),
            primary_role_id: None,
            banned_at: None,
            banned_until: None,
            ban_reason: None,
            created_at: now,
            updated_at: now,
            last_seen_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn ban_expiry() {
        let now = Utc::now();
        let mut u = user();
        assert!(!u.is_banned_at(now));

        u.banned_at = Some(now - Duration::days(1));
        assert!(u.is_banned_at(now), "permanent ban");

        u.banned_until = Some(now + Duration::hours(1));
        assert!(u.is_banned_at(now), "temporary ban still running");

        u.banned_until = Some(now - Duration::hours(1));
        assert!(!u.is_banned_at(now), "expired ban");
    }

    #[test]
    fn password_hash_never_serialized() {
        let value = serde_json::to_value(user()).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["username"], "alice");
    }
}
