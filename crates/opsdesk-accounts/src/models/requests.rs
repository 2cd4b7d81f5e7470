//! Request models for the account services.

use chrono::{DateTime, Utc};
use opsdesk_core::{AccountStatus, Role};
use serde::Deserialize;
use uuid::Uuid;

/// Verified token claims handed over by the gateway after signature checks.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// The provider's stable subject identifier.
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    /// Raw role claims; normalized by the policy, not here.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Sort direction; descending unless asked otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// The SQL keyword for this direction.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query parameters for the user directory search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListUsersQuery {
    /// Free-text query over name/username/email/phone.
    #[serde(default)]
    pub q: Option<String>,

    /// Exact-match role filter.
    #[serde(default)]
    pub role: Option<Role>,

    /// Exact-match status filter.
    #[serde(default)]
    pub status: Option<AccountStatus>,

    /// Filter by department.
    #[serde(default)]
    pub department_id: Option<Uuid>,

    /// Filter by reporting manager.
    #[serde(default)]
    pub manager_id: Option<Uuid>,

    /// Inclusive creation-date range.
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,

    /// Inclusive last-login range.
    #[serde(default)]
    pub last_login_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login_to: Option<DateTime<Utc>>,

    /// Sort key; anything outside the allow-list falls back to `created_at`.
    #[serde(default)]
    pub sort: Option<String>,

    /// Sort direction (default DESC).
    #[serde(default)]
    pub order: Option<SortOrder>,

    /// Page number, 1-based (default 1).
    #[serde(default)]
    pub page: Option<i64>,

    /// Page size (default 20, max 100).
    #[serde(default)]
    pub limit: Option<i64>,
}

impl ListUsersQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: i64 = 20;

    /// Maximum allowed page size.
    pub const MAX_LIMIT: i64 = 100;

    /// Columns the directory may sort by.
    const SORTABLE: [&'static str; 5] = ["created_at", "name", "last_login_at", "role", "status"];

    /// The page number, at least 1.
    #[must_use]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// The page size, clamped to the valid range.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    /// The row offset implied by page and limit.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// The sort column, restricted to the allow-list. Unknown values silently
    /// fall back to `created_at` so callers cannot inject identifiers.
    #[must_use]
    pub fn sort_column(&self) -> &'static str {
        self.sort
            .as_deref()
            .and_then(|requested| {
                Self::SORTABLE
                    .iter()
                    .find(|allowed| **allowed == requested)
                    .copied()
            })
            .unwrap_or("created_at")
    }

    /// The sort direction, DESC by default.
    #[must_use]
    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or(SortOrder::Desc)
    }
}

/// Self-service profile patch.
///
/// Unknown fields are rejected at deserialization, so a payload smuggling
/// `role`, `status`, `department_id` or `manager_id` never reaches the
/// service at all.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSelfRequest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

/// Lock or unlock an account.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: AccountStatus,

    /// Stored while locked; ignored on unlock.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Move a user into a department.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignDepartmentRequest {
    pub department_id: Uuid,
}

/// Point an engineer at a new reporting manager.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignManagerRequest {
    pub manager_id: Uuid,
}

/// Reassign every engineer of one manager to another.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkReassignRequest {
    pub manager_id: Uuid,
    pub new_manager_id: Uuid,
}

/// Replace a user's effective role.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

/// Invite a new user through the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,

    /// Required when role is manager.
    #[serde(default)]
    pub department_id: Option<Uuid>,

    /// Required when role is engineer.
    #[serde(default)]
    pub manager_id: Option<Uuid>,
}

/// Query parameters for the department listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDepartmentsQuery {
    /// Free-text query over name/code.
    #[serde(default)]
    pub q: Option<String>,

    #[serde(default)]
    pub is_active: Option<bool>,

    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sort: Option<String>,

    #[serde(default)]
    pub order: Option<SortOrder>,

    #[serde(default)]
    pub page: Option<i64>,

    #[serde(default)]
    pub limit: Option<i64>,
}

impl ListDepartmentsQuery {
    const SORTABLE: [&'static str; 3] = ["created_at", "code", "name"];

    /// The page number, at least 1.
    #[must_use]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// The page size, clamped to the valid range.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(ListUsersQuery::DEFAULT_LIMIT)
            .clamp(1, ListUsersQuery::MAX_LIMIT)
    }

    /// The row offset implied by page and limit.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// The sort column, restricted to the allow-list.
    #[must_use]
    pub fn sort_column(&self) -> &'static str {
        self.sort
            .as_deref()
            .and_then(|requested| {
                Self::SORTABLE
                    .iter()
                    .find(|allowed| **allowed == requested)
                    .copied()
            })
            .unwrap_or("created_at")
    }

    /// The sort direction, DESC by default.
    #[must_use]
    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or(SortOrder::Desc)
    }
}

/// Create or update a department.
#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentUpsertRequest {
    pub code: String,
    pub name: String,

    #[serde(default)]
    pub is_active: Option<bool>,
}
