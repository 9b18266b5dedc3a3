use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::ServiceResult;
use crate::auth::{hash_password, issue_token, verify_password, IssuedToken};
use crate::config;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::validate_user::banned_error;
use crate::middleware::CurrentUser;
use crate::permissions::{EffectivePermissions, PermissionStore};
use crate::validation::{self, FieldErrors};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email address
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub user: User,
    #[serde(flatten)]
    pub token: IssuedToken,
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub user: User,
    #[serde(flatten)]
    pub access: EffectivePermissions,
}

pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, input: RegisterRequest) -> ServiceResult<AuthSession> {
        let username = input.username.trim();
        let email = input.email.trim().to_lowercase();

        let mut errors = FieldErrors::new();
        errors
            .check("username", validation::username(username))
            .check("email", validation::email(&email))
            .check("password", validation::password(&input.password));
        errors.into_result()?;

        let default_role = &config::config().security.default_role;
        let role = PermissionStore::new(self.pool.clone()).role_by_name(default_role).await.map_err(|e| {
            tracing::error!("Default role '{}' is missing: {}", default_role, e);
            ApiError::internal_server_error("Registration is not configured")
        })?;

        let password_hash = hash_password(&input.password)?;
        let display_name = input.display_name.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, display_name, primary_role_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(&email)
        .bind(&password_hash)
        .bind(display_name)
        .bind(role.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Username or email is already taken"),
            other => other,
        })?;

        tracing::info!("Registered user '{}' with role '{}'", user.username, role.name);
        let token = issue_token(user.id, &user.username)?;
        Ok(AuthSession { user, token })
    }

    /// Unknown accounts and wrong passwords get the same answer
    pub async fn login(&self, input: LoginRequest) -> ServiceResult<AuthSession> {
        let invalid = || ApiError::unauthorized("Invalid username or password");

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE (lower(username) = lower($1) OR lower(email) = lower($1)) AND deleted_at IS NULL
            "#,
        )
        .bind(input.login.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user else {
            tracing::warn!("Login failed for unknown account '{}'", input.login.trim());
            return Err(invalid());
        };

        if !verify_password(&input.password, &user.password_hash) {
            tracing::warn!("Login failed for '{}': wrong password", user.username);
            return Err(invalid());
        }

        if user.is_banned() {
            tracing::warn!("Login refused for banned user '{}'", user.username);
            return Err(banned_error(&user));
        }

        let user = sqlx::query_as::<_, User>("UPDATE users SET last_seen_at = now() WHERE id = $1 RETURNING *")
            .bind(user.id)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!("User '{}' logged in", user.username);
        let token = issue_token(user.id, &user.username)?;
        Ok(AuthSession { user, token })
    }

    pub fn whoami(&self, current: &CurrentUser) -> WhoAmI {
        WhoAmI {
            user: current.user.clone(),
            access: current.permissions.clone(),
        }
    }

    pub fn refresh(&self, current: &CurrentUser) -> ServiceResult<IssuedToken> {
        Ok(issue_token(current.id(), current.username())?)
    }

    pub async fn update_profile(&self, current: &CurrentUser, input: UpdateProfile) -> ServiceResult<User> {
        let email = input.email.as_deref().map(|e| e.trim().to_lowercase());
        let display_name = input.display_name.as_deref().map(str::trim);

        let mut errors = FieldErrors::new();
        if let Some(email) = &email {
            errors.check("email", validation::email(email));
        }
        if let Some(name) = display_name {
            errors.check("display_name", validation::display_name(name));
        }
        if let Some(bio) = &input.bio {
            errors.check("bio", validation::bio(bio));
        }
        errors.into_result()?;

        // An empty display name clears it; an absent one leaves it alone
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                display_name = CASE WHEN $2::text IS NULL THEN display_name ELSE NULLIF($2, '') END,
                bio = COALESCE($3, bio),
                email = COALESCE($4, email),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id())
        .bind(display_name)
        .bind(input.bio.as_deref())
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Email is already taken"),
            other => other,
        })?;
        Ok(user)
    }
}
