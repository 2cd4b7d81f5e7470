//! Department entity model.

use chrono::{DateTime, Utc};
use opsdesk_core::DepartmentId;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// An organizational unit. Managers and engineers belong to exactly one.
#[derive(Debug, Clone, FromRow)]
pub struct Department {
    /// Unique identifier.
    pub id: Uuid,

    /// Short unique code, e.g. "ENG".
    pub code: String,

    /// Display name.
    pub name: String,

    /// Inactive departments are kept for history but not assignable.
    pub is_active: bool,

    /// When the department was created.
    pub created_at: DateTime<Utc>,

    /// When the department was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Department {
    /// The row id as a typed `DepartmentId`.
    #[must_use]
    pub fn department_id(&self) -> DepartmentId {
        DepartmentId::from_uuid(self.id)
    }

    /// Find a department by id.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM departments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a department by its unique code.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM departments WHERE code = $1")
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// Lightweight reference rows (id, code, name) for a set of department ids.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn find_refs_by_ids(
        pool: &PgPool,
        ids: &[Uuid],
    ) -> Result<Vec<(Uuid, String, String)>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as("SELECT id, code, name FROM departments WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Count users currently referencing this department.
    ///
    /// Used as the delete guard: a referenced department cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` if the query fails.
    pub async fn in_use_count(pool: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE department_id = $1")
                .bind(id)
                .fetch_one(pool)
                .await?;
        Ok(count.0)
    }
}
