//! Directory query engine.
//!
//! Builds and executes filtered/sorted/paginated searches across free-text
//! and structured predicates, shaping every result through the visibility
//! policy with the *viewer's* role.

use crate::error::AccountsError;
use crate::models::{DepartmentRef, ListUsersQuery, ManagerRef, Page, UserView};
use crate::policy;
use crate::services::load_refs;
use opsdesk_core::{AccountStatus, RequestContext, Role};
use opsdesk_db::{Department, User};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use uuid::Uuid;

/// Escape LIKE special characters (`%`, `_`, `\`) in a search term.
///
/// Returns a lowercased, escaped string suitable for `LOWER(col) LIKE $N`.
fn escape_like(input: &str) -> String {
    input
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Columns the free-text term is matched against, OR-combined.
const TEXT_COLUMNS: [&str; 4] = ["name", "username", "email", "phone"];

/// Read side of the directory.
#[derive(Clone)]
pub struct DirectoryService {
    pool: PgPool,
}

impl DirectoryService {
    /// Create a new directory service.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append the WHERE fragments for `query` to `sql`, starting at parameter
    /// index `param_idx`. The same fragments serve the count and page
    /// queries, so the bind order below must match [`bind_filters`].
    fn push_filters(sql: &mut String, query: &ListUsersQuery, mut param_idx: usize) -> usize {
        if query.q.as_deref().is_some_and(|q| !q.trim().is_empty()) {
            let mut parts = Vec::with_capacity(TEXT_COLUMNS.len());
            for column in TEXT_COLUMNS {
                parts.push(format!("LOWER({column}) LIKE ${param_idx}"));
                param_idx += 1;
            }
            sql.push_str(&format!(" AND ({})", parts.join(" OR ")));
        }
        if query.role.is_some() {
            sql.push_str(&format!(" AND role = ${param_idx}"));
            param_idx += 1;
        }
        if query.status.is_some() {
            sql.push_str(&format!(" AND status = ${param_idx}"));
            param_idx += 1;
        }
        if query.department_id.is_some() {
            sql.push_str(&format!(" AND department_id = ${param_idx}"));
            param_idx += 1;
        }
        if query.manager_id.is_some() {
            sql.push_str(&format!(" AND manager_id = ${param_idx}"));
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
        if query.last_login_from.is_some() {
            sql.push_str(&format!(" AND last_login_at >= ${param_idx}"));
            param_idx += 1;
        }
        if query.last_login_to.is_some() {
            sql.push_str(&format!(" AND last_login_at <= ${param_idx}"));
            param_idx += 1;
        }
        param_idx
    }

    /// Directory search with role-scoped shaping.
    ///
    /// All filters are ANDed; the free-text term OR-expands across the four
    /// text columns while still being ANDed with the rest. Results carry a
    /// secondary `id ASC` order so pagination stays stable when the primary
    /// sort key has ties.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::InvalidRequestUser`] when the viewer's `sub`
    /// is not provisioned, and [`AccountsError::Database`] on store failures.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        viewer_sub: &str,
        query: &ListUsersQuery,
    ) -> Result<Page<UserView>, AccountsError> {
        let viewer = User::find_by_sub(&self.pool, viewer_sub)
            .await?
            .ok_or(AccountsError::InvalidRequestUser)?;

        let pattern = query
            .q
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(|q| format!("%{}%", escape_like(q.trim())));

        let total: i64 = {
            let mut sql = String::from("SELECT COUNT(*) FROM users WHERE TRUE");
            Self::push_filters(&mut sql, query, 1);

            let mut q = sqlx::query_scalar::<_, i64>(&sql);
            q = Self::bind_filters_scalar(q, query, pattern.as_deref());
            q.fetch_one(&self.pool).await?
        };

        let users: Vec<User> = {
            let mut sql = String::from("SELECT * FROM users WHERE TRUE");
            let param_idx = Self::push_filters(&mut sql, query, 1);
            sql.push_str(&format!(
                " ORDER BY {} {}, id ASC LIMIT ${param_idx} OFFSET ${}",
                query.sort_column(),
                query.order().as_sql(),
                param_idx + 1
            ));

            let mut q = sqlx::query_as::<_, User>(&sql);
            q = Self::bind_filters_as(q, query, pattern.as_deref());
            q = q.bind(query.limit()).bind(query.offset());
            q.fetch_all(&self.pool).await?
        };

        let items = self.shape_rows(&users, viewer.role()).await?;

        tracing::debug!(
            request_id = %ctx.request_id,
            viewer_id = %viewer.id,
            total,
            returned = items.len(),
            page = query.page(),
            limit = query.limit(),
            "Searched directory"
        );

        Ok(Page {
            items,
            total,
            page: query.page(),
            limit: query.limit(),
        })
    }

    /// Fetch a single record, applying the manager scoping rule: a manager
    /// only sees active engineers who report to them; a miss is NOT_FOUND so
    /// existence never leaks.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::InvalidRequestUser`] for an unprovisioned
    /// viewer and [`AccountsError::UserNotFound`] when the record is absent
    /// or outside the viewer's scope.
    pub async fn get_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        viewer_sub: &str,
    ) -> Result<UserView, AccountsError> {
        let viewer = User::find_by_sub(&self.pool, viewer_sub)
            .await?
            .ok_or(AccountsError::InvalidRequestUser)?;

        let target = User::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountsError::UserNotFound)?;

        if viewer.role() == Role::Manager {
            let reports_to_viewer = target.manager_id == Some(viewer.id);
            let active_engineer = target.role() == Role::Engineer
                && target.status() == AccountStatus::Active;
            if !(reports_to_viewer && active_engineer) {
                return Err(AccountsError::UserNotFound);
            }
        }

        let (department, manager) = load_refs(&self.pool, &target).await?;

        tracing::debug!(
            request_id = %ctx.request_id,
            user_id = %target.id,
            viewer_id = %viewer.id,
            "Fetched user"
        );

        Ok(UserView::shape(&target, department, manager, viewer.role()))
    }

    /// Fetch the caller's own record, shaped with their own role.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::UserNotFound`] if the subject has no row.
    pub async fn get_self(
        &self,
        ctx: &RequestContext,
        sub: &str,
    ) -> Result<UserView, AccountsError> {
        let user = User::find_by_sub(&self.pool, sub)
            .await?
            .ok_or(AccountsError::UserNotFound)?;

        let (department, manager) = load_refs(&self.pool, &user).await?;

        tracing::debug!(request_id = %ctx.request_id, user_id = %user.id, "Fetched self");

        Ok(UserView::shape(&user, department, manager, user.role()))
    }

    /// Shape a page of rows, batch-fetching the referenced departments and
    /// managers instead of a lookup per row.
    async fn shape_rows(
        &self,
        users: &[User],
        viewer_role: Role,
    ) -> Result<Vec<UserView>, AccountsError> {
        if !policy::relations_visible(viewer_role) {
            return Ok(users
                .iter()
                .map(|u| UserView::shape(u, None, None, viewer_role))
                .collect());
        }

        let dept_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = users.iter().filter_map(|u| u.department_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let manager_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = users.iter().filter_map(|u| u.manager_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let dept_map: HashMap<Uuid, DepartmentRef> =
            Department::find_refs_by_ids(&self.pool, &dept_ids)
                .await?
                .into_iter()
                .map(|(id, code, name)| (id, DepartmentRef { id, code, name }))
                .collect();

        let manager_map: HashMap<Uuid, ManagerRef> =
            User::find_refs_by_ids(&self.pool, &manager_ids)
                .await?
                .into_iter()
                .map(|(id, name, email)| (id, ManagerRef { id, name, email }))
                .collect();

        Ok(users
            .iter()
            .map(|u| {
                let department = u.department_id.and_then(|id| dept_map.get(&id).cloned());
                let manager = u.manager_id.and_then(|id| manager_map.get(&id).cloned());
                UserView::shape(u, department, manager, viewer_role)
            })
            .collect())
    }

    /// Bind filter values for the count query, in [`push_filters`] order.
    fn bind_filters_scalar<'q>(
        mut q: sqlx::query::QueryScalar<'q, Postgres, i64, PgArguments>,
        query: &'q ListUsersQuery,
        pattern: Option<&str>,
    ) -> sqlx::query::QueryScalar<'q, Postgres, i64, PgArguments> {
        if let Some(pattern) = pattern {
            for _ in TEXT_COLUMNS {
                q = q.bind(pattern.to_string());
            }
        }
        if let Some(role) = query.role {
            q = q.bind(role.as_str());
        }
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        if let Some(department_id) = query.department_id {
            q = q.bind(department_id);
        }
        if let Some(manager_id) = query.manager_id {
            q = q.bind(manager_id);
        }
        if let Some(created_from) = query.created_from {
            q = q.bind(created_from);
        }
        if let Some(created_to) = query.created_to {
            q = q.bind(created_to);
        }
        if let Some(last_login_from) = query.last_login_from {
            q = q.bind(last_login_from);
        }
        if let Some(last_login_to) = query.last_login_to {
            q = q.bind(last_login_to);
        }
        q
    }

    /// Bind filter values for the page query, in [`push_filters`] order.
    fn bind_filters_as<'q>(
        mut q: QueryAs<'q, Postgres, User, PgArguments>,
        query: &'q ListUsersQuery,
        pattern: Option<&str>,
    ) -> QueryAs<'q, Postgres, User, PgArguments> {
        if let Some(pattern) = pattern {
            for _ in TEXT_COLUMNS {
                q = q.bind(pattern.to_string());
            }
        }
        if let Some(role) = query.role {
            q = q.bind(role.as_str());
        }
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        if let Some(department_id) = query.department_id {
            q = q.bind(department_id);
        }
        if let Some(manager_id) = query.manager_id {
            q = q.bind(manager_id);
        }
        if let Some(created_from) = query.created_from {
            q = q.bind(created_from);
        }
        if let Some(created_to) = query.created_to {
            q = q.bind(created_to);
        }
        if let Some(last_login_from) = query.last_login_from {
            q = q.bind(last_login_from);
        }
        if let Some(last_login_to) = query.last_login_to {
            q = q.bind(last_login_to);
        }
        q
    }
}
