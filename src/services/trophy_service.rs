use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::{user_by_username, ServiceResult};
use crate::database::models::{AwardedTrophy, Trophy};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::observer::{ForumEvent, ObserverPipeline};
use crate::permissions::catalogue::{TROPHIES_AWARD, TROPHIES_MANAGE};
use crate::validation::{self, FieldErrors};

/// How a trophy is earned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrophyCriteria {
    Manual,
    PostCount,
    CommentCount,
    LikesReceived,
    AccountAgeDays,
}

impl TrophyCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrophyCriteria::Manual => "manual",
            TrophyCriteria::PostCount => "post_count",
            TrophyCriteria::CommentCount => "comment_count",
            TrophyCriteria::LikesReceived => "likes_received",
            TrophyCriteria::AccountAgeDays => "account_age_days",
        }
    }
}

impl fmt::Display for TrophyCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrophyCriteria {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TrophyCriteria::Manual),
            "post_count" => Ok(TrophyCriteria::PostCount),
            "comment_count" => Ok(TrophyCriteria::CommentCount),
            "likes_received" => Ok(TrophyCriteria::LikesReceived),
            "account_age_days" => Ok(TrophyCriteria::AccountAgeDays),
            other => Err(format!("Unknown trophy criteria '{}'", other)),
        }
    }
}

/// Activity figures the automatic criteria are measured against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct UserStats {
    pub posts: i64,
    pub comments: i64,
    pub likes_received: i64,
    pub account_age_days: i64,
}

/// Manual trophies are never earned automatically
pub fn qualifies(criteria: TrophyCriteria, threshold: i64, stats: &UserStats) -> bool {
    let value = match criteria {
        TrophyCriteria::Manual => return false,
        TrophyCriteria::PostCount => stats.posts,
        TrophyCriteria::CommentCount => stats.comments,
        TrophyCriteria::LikesReceived => stats.likes_received,
        TrophyCriteria::AccountAgeDays => stats.account_age_days,
    };
    value >= threshold
}

/// Trophies from `catalogue` the user has earned but does not hold yet
pub fn newly_earned<'a>(catalogue: &'a [Trophy], held: &[Uuid], stats: &UserStats) -> Vec<&'a Trophy> {
    catalogue
        .iter()
        .filter(|t| !held.contains(&t.id))
        .filter(|t| match t.criteria_kind.parse::<TrophyCriteria>() {
            Ok(criteria) => qualifies(criteria, t.threshold, stats),
            Err(e) => {
                tracing::warn!("Trophy '{}' skipped: {}", t.slug, e);
                false
            }
        })
        .collect()
}

/// Award bookkeeping shared by the service and the trophy observer
#[derive(Clone)]
pub struct TrophyLedger {
    pool: PgPool,
}

impl TrophyLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn stats_for(&self, user_id: Uuid) -> ServiceResult<UserStats> {
        let stats = sqlx::query_as::<_, UserStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM posts WHERE author_id = $1 AND deleted_at IS NULL) AS posts,
                (SELECT COUNT(*) FROM comments WHERE author_id = $1 AND deleted_at IS NULL) AS comments,
                (SELECT COALESCE(SUM(like_count), 0)::BIGINT FROM posts WHERE author_id = $1 AND deleted_at IS NULL) AS likes_received,
                COALESCE((SELECT EXTRACT(DAY FROM now() - created_at)::BIGINT FROM users WHERE id = $1), 0) AS account_age_days
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Idempotent; returns whether the user did not already hold the trophy
    pub async fn grant(&self, user_id: Uuid, trophy_id: Uuid, awarded_by: Option<Uuid>) -> ServiceResult<bool> {
        let result = sqlx::query(
            "INSERT INTO user_trophies (user_id, trophy_id, awarded_by) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(trophy_id)
        .bind(awarded_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Award every automatic trophy the user now qualifies for
    pub async fn evaluate(&self, user_id: Uuid) -> ServiceResult<Vec<Trophy>> {
        let catalogue = sqlx::query_as::<_, Trophy>("SELECT * FROM trophies WHERE criteria_kind <> 'manual'")
            .fetch_all(&self.pool)
            .await?;
        let held = sqlx::query_scalar::<_, Uuid>("SELECT trophy_id FROM user_trophies WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let stats = self.stats_for(user_id).await?;

        let mut awarded = Vec::new();
        for trophy in newly_earned(&catalogue, &held, &stats) {
            if self.grant(user_id, trophy.id, None).await? {
                tracing::info!("User {} earned trophy '{}'", user_id, trophy.slug);
                awarded.push(trophy.clone());
            }
        }
        Ok(awarded)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTrophy {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_criteria")]
    pub criteria: String,
    #[serde(default)]
    pub threshold: i64,
}

fn default_criteria() -> String {
    TrophyCriteria::Manual.as_str().to_string()
}

/// Result of a manual award
#[derive(Debug, Serialize)]
pub struct AwardOutcome {
    pub trophy: Trophy,
    pub user_id: Uuid,
    /// False when the user already held it
    pub newly_awarded: bool,
}

pub struct TrophyService {
    pool: PgPool,
    ledger: TrophyLedger,
    events: Arc<ObserverPipeline>,
}

impl TrophyService {
    pub fn new(pool: PgPool, events: Arc<ObserverPipeline>) -> Self {
        let ledger = TrophyLedger::new(pool.clone());
        Self { pool, ledger, events }
    }

    pub async fn list(&self) -> ServiceResult<Vec<Trophy>> {
        let trophies = sqlx::query_as::<_, Trophy>("SELECT * FROM trophies ORDER BY criteria_kind, threshold, name")
            .fetch_all(&self.pool)
            .await?;
        Ok(trophies)
    }

    pub async fn by_slug(&self, slug: &str) -> ServiceResult<Trophy> {
        sqlx::query_as::<_, Trophy>("SELECT * FROM trophies WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Trophy '{}' not found", slug)))
    }

    pub async fn create(&self, current: &CurrentUser, input: CreateTrophy) -> ServiceResult<Trophy> {
        current.require(&TROPHIES_MANAGE)?;

        let mut errors = FieldErrors::new();
        errors
            .check("slug", validation::slug(&input.slug))
            .check("name", non_empty(&input.name))
            .check("criteria", input.criteria.parse::<TrophyCriteria>().map(|_| ()))
            .check("threshold", if input.threshold < 0 { Err("Threshold cannot be negative".to_string()) } else { Ok(()) });
        errors.into_result()?;

        let trophy = sqlx::query_as::<_, Trophy>(
            r#"
            INSERT INTO trophies (slug, name, description, icon, criteria_kind, threshold)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.slug)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.icon)
        .bind(&input.criteria)
        .bind(input.threshold)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict(format!("Trophy '{}' already exists", input.slug)),
            other => other,
        })?;

        tracing::info!("Trophy '{}' created by {}", trophy.slug, current.username());
        Ok(trophy)
    }

    pub async fn delete(&self, current: &CurrentUser, slug: &str) -> ServiceResult<()> {
        current.require(&TROPHIES_MANAGE)?;
        let result = sqlx::query("DELETE FROM trophies WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Trophy '{}' not found", slug)));
        }
        tracing::info!("Trophy '{}' deleted by {}", slug, current.username());
        Ok(())
    }

    pub async fn award(&self, current: &CurrentUser, slug: &str, username: &str) -> ServiceResult<AwardOutcome> {
        current.require(&TROPHIES_AWARD)?;
        self.award_as(Some(current.id()), slug, username).await
    }

    /// Award without a permission check; `awarded_by` is `None` from the command line
    pub async fn award_as(&self, awarded_by: Option<Uuid>, slug: &str, username: &str) -> ServiceResult<AwardOutcome> {
        let trophy = self.by_slug(slug).await?;
        let user = user_by_username(&self.pool, username).await?;
        let newly_awarded = self.ledger.grant(user.id, trophy.id, awarded_by).await?;

        if newly_awarded {
            tracing::info!("Trophy '{}' awarded to {}", trophy.slug, user.username);
            self.events
                .emit(ForumEvent::TrophyAwarded {
                    user_id: user.id,
                    trophy: trophy.clone(),
                    awarded_by,
                })
                .await;
        }

        Ok(AwardOutcome {
            trophy,
            user_id: user.id,
            newly_awarded,
        })
    }

    pub async fn revoke(&self, current: &CurrentUser, slug: &str, username: &str) -> ServiceResult<()> {
        current.require(&TROPHIES_AWARD)?;
        let trophy = self.by_slug(slug).await?;
        let user = user_by_username(&self.pool, username).await?;
        sqlx::query("DELETE FROM user_trophies WHERE user_id = $1 AND trophy_id = $2")
            .bind(user.id)
            .bind(trophy.id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Trophy '{}' revoked from {} by {}", trophy.slug, user.username, current.username());
        Ok(())
    }

    pub async fn for_user(&self, username: &str) -> ServiceResult<Vec<AwardedTrophy>> {
        let user = user_by_username(&self.pool, username).await?;
        let trophies = sqlx::query_as::<_, AwardedTrophy>(
            r#"
            SELECT t.id AS trophy_id, t.slug, t.name, t.description, t.icon, ut.awarded_by, ut.awarded_at
            FROM user_trophies ut
            JOIN trophies t ON t.id = ut.trophy_id
            WHERE ut.user_id = $1
            ORDER BY ut.awarded_at
            "#,
        )
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(trophies)
    }
}

fn non_empty(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("Cannot be empty".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn trophy(slug: &str, criteria: &str, threshold: i64, created_at: DateTime<Utc>) -> Trophy {
        Trophy {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_string(),
            description: String::new(),
            icon: String::new(),
            criteria_kind: criteria.to_string(),
            threshold,
            created_at,
        }
    }

    fn stats(posts: i64, comments: i64, likes: i64, days: i64) -> UserStats {
        UserStats {
            posts,
            comments,
            likes_received: likes,
            account_age_days: days,
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        let s = stats(10, 0, 0, 0);
        assert!(qualifies(TrophyCriteria::PostCount, 10, &s));
        assert!(!qualifies(TrophyCriteria::PostCount, 11, &s));
    }

    #[test]
    fn manual_trophies_never_qualify() {
        assert!(!qualifies(TrophyCriteria::Manual, 0, &stats(100, 100, 100, 100)));
    }

    #[test]
    fn each_criterion_reads_its_own_figure() {
        let s = stats(1, 2, 3, 4);
        assert!(qualifies(TrophyCriteria::CommentCount, 2, &s));
        assert!(!qualifies(TrophyCriteria::CommentCount, 3, &s));
        assert!(qualifies(TrophyCriteria::LikesReceived, 3, &s));
        assert!(qualifies(TrophyCriteria::AccountAgeDays, 4, &s));
        assert!(!qualifies(TrophyCriteria::AccountAgeDays, 5, &s));
    }

    #[test]
    fn newly_earned_skips_held_and_unknown() {
        let now = Utc::now();
        let first = trophy("first-post", "post_count", 1, now);
        let prolific = trophy("prolific", "post_count", 50, now);
        let veteran = trophy("veteran", "account_age_days", 365, now);
        let broken = trophy("broken", "karma", 1, now);
        let catalogue = vec![first.clone(), prolific, veteran, broken];

        let s = stats(3, 0, 0, 400);
        let earned: Vec<&str> = newly_earned(&catalogue, &[], &s).iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(earned, vec!["first-post", "veteran"]);

        let earned: Vec<&str> = newly_earned(&catalogue, &[first.id], &s).iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(earned, vec!["veteran"]);
    }

    #[test]
    fn criteria_text_form() {
        assert_eq!("likes_received".parse::<TrophyCriteria>().unwrap(), TrophyCriteria::LikesReceived);
        assert_eq!(TrophyCriteria::AccountAgeDays.to_string(), "account_age_days");
        assert!("karma".parse::<TrophyCriteria>().is_err());
    }
}
