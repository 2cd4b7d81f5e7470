//! Response models for the account services.
//!
//! `UserView` is the only shape that leaves the directory. The relation
//! fields are populated through the visibility policy and omitted from the
//! serialized form entirely when absent, so a viewer outside the allow-list
//! never sees the keys at all.

use crate::policy;
use chrono::{DateTime, Utc};
use opsdesk_core::{AccountStatus, Role};
use opsdesk_db::{Department, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Department reference embedded in a user view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentRef {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// Reporting-manager reference embedded in a user view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerRef {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A user as shaped for a particular viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    pub role: Role,

    pub status: AccountStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_reason: Option<String>,

    /// Present only for viewers inside the visibility allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<DepartmentRef>,

    /// Present only for viewers inside the visibility allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_manager: Option<ManagerRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl UserView {
    /// Shape a stored row for a viewer. Relation fields are dropped unless
    /// the viewer's visibility groups allow them.
    #[must_use]
    pub fn shape(
        user: &User,
        department: Option<DepartmentRef>,
        manager: Option<ManagerRef>,
        viewer: Role,
    ) -> Self {
        let show_relations = policy::relations_visible(viewer);
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            username: user.username.clone(),
            phone: user.phone.clone(),
            role: user.role(),
            status: user.status(),
            locked_reason: user.locked_reason.clone(),
            department: if show_relations { department } else { None },
            reporting_manager: if show_relations { manager } else { None },
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Result of the idempotent provisioning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureOutcome {
    pub user_id: Uuid,
    pub is_first_login: bool,
}

/// One page of a directory or department listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Result of a bulk manager reassignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkReassignResult {
    pub affected: u64,
}

/// A realm role as exposed to the admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A department as exposed to the admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentView {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Department> for DepartmentView {
    fn from(dept: Department) -> Self {
        Self {
            id: dept.id,
            code: dept.code,
            name: dept.name,
            is_active: dept.is_active,
            created_at: dept.created_at,
            updated_at: dept.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            sub: "sub-1".to_string(),
            email: Some("jane@example.com".to_string()),
            name: Some("Jane".to_string()),
            username: Some("jane".to_string()),
            phone: None,
            role: "engineer".to_string(),
            status: "active".to_string(),
            locked_reason: None,
            department_id: Some(Uuid::new_v4()),
            manager_id: Some(Uuid::new_v4()),
            first_login_at: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_refs(user: &User) -> (Option<DepartmentRef>, Option<ManagerRef>) {
        (
            Some(DepartmentRef {
                id: user.department_id.unwrap(),
                code: "ENG".to_string(),
                name: "Engineering".to_string(),
            }),
            Some(ManagerRef {
                id: user.manager_id.unwrap(),
                name: Some("Mandy".to_string()),
                email: None,
            }),
        )
    }

    #[test]
    fn test_admin_viewer_sees_relations() {
        let user = sample_user();
        let (dept, mgr) = sample_refs(&user);
        let view = UserView::shape(&user, dept, mgr, Role::Admin);
        assert!(view.department.is_some());
        assert!(view.reporting_manager.is_some());
    }

    #[test]
    fn test_plain_user_viewer_sees_no_relation_keys() {
        let user = sample_user();
        let (dept, mgr) = sample_refs(&user);
        let view = UserView::shape(&user, dept, mgr, Role::User);
        assert!(view.department.is_none());
        assert!(view.reporting_manager.is_none());

        // The keys are absent from the serialized form, not just null
        let json = serde_json::to_value(&view).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("department"));
        assert!(!object.contains_key("reporting_manager"));
    }

    #[test]
    fn test_sub_never_appears_in_view() {
        let user = sample_user();
        let view = UserView::shape(&user, None, None, Role::Admin);
        let json = serde_json::to_value(&view).unwrap();
        assert!(!json.as_object().unwrap().contains_key("sub"));
    }

    #[test]
    fn test_view_carries_typed_role_and_status() {
        let user = sample_user();
        let view = UserView::shape(&user, None, None, Role::Manager);
        assert_eq!(view.role, Role::Engineer);
        assert_eq!(view.status, AccountStatus::Active);
    }
}
