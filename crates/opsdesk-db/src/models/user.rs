//! User entity model.
//!
//! One row per authenticated principal. The identity provider's `sub` claim
//! is the only join key between a login event and a local row; `role` is a
//! cached projection of the provider's realm-role assignment.

use chrono::{DateTime, Utc};
use opsdesk_core::{AccountStatus, Role, UserId};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A user account in the directory.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Internal row id, referenced by other entities.
    pub id: Uuid,

    /// Stable unique subject from the identity provider.
    pub sub: String,

    /// Email address; filled on first provisioning call that carries one.
    pub email: Option<String>,

    /// Display name.
    pub name: Option<String>,

    /// Preferred username from the provider.
    pub username: Option<String>,

    /// Phone number, self-service editable.
    pub phone: Option<String>,

    /// Single effective role, stored as text.
    pub role: String,

    /// Account status (`active` or `locked`), stored as text.
    pub status: String,

    /// Free-text reason recorded while the account is locked.
    pub locked_reason: Option<String>,

    /// Department the user belongs to; only managers and engineers hold one.
    pub department_id: Option<Uuid>,

    /// Reporting manager; meaningful only when role = engineer.
    pub manager_id: Option<Uuid>,

    /// Set once by the provisioning call that created the row.
    pub first_login_at: Option<DateTime<Utc>>,

    /// Touched by every provisioning call.
    pub last_login_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The row id as a typed `UserId`.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(self.id)
    }

    /// The stored role as the typed enumeration.
    ///
    /// Rows are constrained to the enumeration by a CHECK constraint; an
    /// unparseable value falls back to the least-privileged role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }

    /// The stored status as the typed enumeration.
    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status.parse().unwrap_or(AccountStatus::Active)
    }

    /// Find a user by row id.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by the identity provider's subject.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn find_by_sub(pool: &PgPool, sub: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE sub = $1")
            .bind(sub)
            .fetch_optional(pool)
            .await
    }

    /// Count engineers whose `manager_id` points at the given user.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn count_reports(pool: &PgPool, manager_id: Uuid) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE manager_id = $1 AND role = 'engineer'")
                .bind(manager_id)
                .fetch_one(pool)
                .await?;
        Ok(count.0)
    }

    /// Lightweight reference rows (id, name, email) for a set of user ids.
    ///
    /// Used to shape `reporting_manager` fields without loading full rows.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn find_refs_by_ids(
        pool: &PgPool,
        ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Option<String>, Option<String>)>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as("SELECT id, name, email FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
