//! Request and response models at the service boundary.

pub mod requests;
pub mod responses;

pub use requests::{
    AssignDepartmentRequest, AssignManagerRequest, BulkReassignRequest, ChangeRoleRequest,
    ChangeStatusRequest, DepartmentUpsertRequest, IdentityClaims, InviteUserRequest,
    ListDepartmentsQuery, ListUsersQuery, SortOrder, UpdateSelfRequest,
};
pub use responses::{
    BulkReassignResult, DepartmentRef, DepartmentView, EnsureOutcome, ManagerRef, Page, RoleInfo,
    UserView,
};
