//! Department administration.
//!
//! CRUD over organizational units, with the "in use" guard preventing
//! deletion while any user still references the department.

use crate::error::AccountsError;
use crate::models::{DepartmentUpsertRequest, DepartmentView, ListDepartmentsQuery, Page};
use chrono::Utc;
use opsdesk_core::RequestContext;
use opsdesk_db::Department;
use sqlx::PgPool;
use uuid::Uuid;

/// Escape LIKE special characters in a search term, lowercased.
fn escape_like(input: &str) -> String {
    input
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Department reads and mutations.
#[derive(Clone)]
pub struct DepartmentService {
    pool: PgPool,
}

impl DepartmentService {
    /// Create a new department service.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(sql: &mut String, query: &ListDepartmentsQuery, mut param_idx: usize) -> usize {
        if query.q.as_deref().is_some_and(|q| !q.trim().is_empty()) {
            sql.push_str(&format!(
                " AND (LOWER(name) LIKE ${param_idx} OR LOWER(code) LIKE ${})",
                param_idx + 1
            ));
            param_idx += 2;
        }
        if query.is_active.is_some() {
            sql.push_str(&format!(" AND is_active = ${param_idx}"));
            param_idx += 1;
        }
        if query.created_from.is_some() {
            sql.push_str(&format!(" AND created_at >= ${param_idx}"));
            param_idx += 1;
        }
        if query.created_to.is_some() {
            sql.push_str(&format!(" AND created_at <= ${param_idx}"));
            param_idx += 1;
        }
        param_idx
    }

    /// List departments with free-text and structured filters.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::Database`] on store failures.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        query: &ListDepartmentsQuery,
    ) -> Result<Page<DepartmentView>, AccountsError> {
        let pattern = query
            .q
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(|q| format!("%{}%", escape_like(q.trim())));

        let total: i64 = {
            let mut sql = String::from("SELECT COUNT(*) FROM departments WHERE TRUE");
            Self::push_filters(&mut sql, query, 1);

            let mut q = sqlx::query_scalar::<_, i64>(&sql);
            if let Some(pattern) = &pattern {
                q = q.bind(pattern.clone()).bind(pattern.clone());
            }
            if let Some(is_active) = query.is_active {
                q = q.bind(is_active);
            }
            if let Some(created_from) = query.created_from {
                q = q.bind(created_from);
            }
            if let Some(created_to) = query.created_to {
                q = q.bind(created_to);
            }
            q.fetch_one(&self.pool).await?
        };

        let rows: Vec<Department> = {
            let mut sql = String::from("SELECT * FROM departments WHERE TRUE");
            let param_idx = Self::push_filters(&mut sql, query, 1);
            sql.push_str(&format!(
                " ORDER BY {} {}, id ASC LIMIT ${param_idx} OFFSET ${}",
                query.sort_column(),
                query.order().as_sql(),
                param_idx + 1
            ));

            let mut q = sqlx::query_as::<_, Department>(&sql);
            if let Some(pattern) = &pattern {
                q = q.bind(pattern.clone()).bind(pattern.clone());
            }
            if let Some(is_active) = query.is_active {
                q = q.bind(is_active);
            }
            if let Some(created_from) = query.created_from {
                q = q.bind(created_from);
            }
            if let Some(created_to) = query.created_to {
                q = q.bind(created_to);
            }
            q = q.bind(query.limit()).bind(query.offset());
            q.fetch_all(&self.pool).await?
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            total,
            returned = rows.len(),
            "Listed departments"
        );

        Ok(Page {
            items: rows.into_iter().map(DepartmentView::from).collect(),
            total,
            page: query.page(),
            limit: query.limit(),
        })
    }

    /// Fetch one department.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::DepartmentNotFound`] for an unknown id.
    pub async fn get_by_id(
        &self,
        _ctx: &RequestContext,
        id: Uuid,
    ) -> Result<DepartmentView, AccountsError> {
        let department = Department::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountsError::DepartmentNotFound)?;
        Ok(DepartmentView::from(department))
    }

    /// Create a department. Codes are unique; a duplicate is a conflict, not
    /// an update.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::DepartmentExists`] for a duplicate code.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        data: &DepartmentUpsertRequest,
    ) -> Result<DepartmentView, AccountsError> {
        if Department::find_by_code(&self.pool, &data.code).await?.is_some() {
            return Err(AccountsError::DepartmentExists);
        }

        let department: Department = sqlx::query_as(
            r"
            INSERT INTO departments (code, name, is_active)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(&data.code)
        .bind(&data.name)
        .bind(data.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            department_id = %department.id,
            code = %department.code,
            "Created department"
        );

        Ok(DepartmentView::from(department))
    }

    /// Update a department's code, name or active flag.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::DepartmentNotFound`] for an unknown id and
    /// [`AccountsError::DepartmentExists`] when the new code is taken.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        data: &DepartmentUpsertRequest,
    ) -> Result<DepartmentView, AccountsError> {
        let current = Department::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountsError::DepartmentNotFound)?;

        if data.code != current.code
            && Department::find_by_code(&self.pool, &data.code).await?.is_some()
        {
            return Err(AccountsError::DepartmentExists);
        }

        let department: Department = sqlx::query_as(
            r"
            UPDATE departments
               SET code = $2, name = $3, is_active = $4, updated_at = $5
             WHERE id = $1
             RETURNING *
            ",
        )
        .bind(id)
        .bind(&data.code)
        .bind(&data.name)
        .bind(data.is_active.unwrap_or(current.is_active))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            department_id = %department.id,
            "Updated department"
        );

        Ok(DepartmentView::from(department))
    }

    /// Delete a department not referenced by any user.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::DepartmentNotFound`] for an unknown id and
    /// [`AccountsError::DepartmentInUse`] while users still reference it.
    pub async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<bool, AccountsError> {
        let department = Department::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountsError::DepartmentNotFound)?;

        if Department::in_use_count(&self.pool, department.id).await? > 0 {
            return Err(AccountsError::DepartmentInUse);
        }

        sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(department.id)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            department_id = %department.id,
            "Deleted department"
        );

        Ok(true)
    }
}
