//! Caller profile and role lookup

use shared::models::{AppRole, CallerProfile, CallerRoles, ProfileRole};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// Profile service for reading caller roles
#[derive(Clone)]
pub struct ProfileService {
    db: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    email: Option<String>,
    full_name: Option<String>,
    role: Option<String>,
}

impl ProfileService {
    /// Create a new ProfileService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Profile role and admin flag for an authenticated user
    ///
    /// A user without a profile row has no profile role; admin is granted
    /// only through `user_roles`.
    pub async fn caller_roles(&self, user_id: Uuid) -> AppResult<CallerRoles> {
        let (role, is_admin) = sqlx::query_as::<_, (Option<String>, bool)>(
            r#"
            SELECT (SELECT role FROM profiles WHERE id = $1),
                   EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = 'admin')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(CallerRoles {
            profile_role: role.and_then(|r| ProfileRole::try_from(r).ok()),
            is_admin,
        })
    }

    /// Full profile for `GET /me`
    pub async fn get_profile(&self, user_id: Uuid, token_email: Option<String>) -> AppResult<CallerProfile> {
        let profile = sqlx::query_as::<_, ProfileRow>(
            "SELECT email, full_name, role FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let roles: Vec<String> = sqlx::query_scalar(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        let roles: Vec<AppRole> = roles
            .into_iter()
            .filter_map(|r| AppRole::try_from(r).ok())
            .collect();

        let (email, full_name, profile_role) = match profile {
            Some(p) => (
                p.email.or(token_email),
                p.full_name,
                p.role.and_then(|r| ProfileRole::try_from(r).ok()),
            ),
            None => (token_email, None, None),
        };

        Ok(CallerProfile {
            id: user_id,
            email,
            full_name,
            profile_role,
            is_admin: roles.contains(&AppRole::Admin),
            roles,
        })
    }

    /// Display name used on the leaderboard
    pub async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let name = sqlx::query_scalar::<_, Option<String>>(
            "SELECT COALESCE(NULLIF(btrim(full_name), ''), email) FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(name.flatten())
    }
}
