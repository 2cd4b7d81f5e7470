//! Account services.
//!
//! - [`ProvisioningService`] - idempotent "ensure user exists" step
//! - [`DirectoryService`] - filtered/sorted/paginated directory reads
//! - [`AdminService`] - guarded state-transition mutations
//! - [`DepartmentService`] - department administration

pub mod admin;
pub mod department;
pub mod directory;
pub mod provisioning;

pub use admin::AdminService;
pub use department::DepartmentService;
pub use directory::DirectoryService;
pub use provisioning::ProvisioningService;

use crate::models::{DepartmentRef, ManagerRef};
use opsdesk_db::{Department, User};
use sqlx::PgPool;

/// Resolve the department and manager references for one user row.
pub(crate) async fn load_refs(
    pool: &PgPool,
    user: &User,
) -> Result<(Option<DepartmentRef>, Option<ManagerRef>), sqlx::Error> {
    let department = match user.department_id {
        Some(dept_id) => Department::find_by_id(pool, dept_id).await?.map(|d| DepartmentRef {
            id: d.id,
            code: d.code,
            name: d.name,
        }),
        None => None,
    };

    let manager = match user.manager_id {
        Some(manager_id) => User::find_refs_by_ids(pool, &[manager_id])
            .await?
            .into_iter()
            .next()
            .map(|(id, name, email)| ManagerRef { id, name, email }),
        None => None,
    };

    Ok((department, manager))
}
