//! Error taxonomy for the account directory.
//!
//! Every service method fails fast with a typed error carrying a stable
//! machine code plus a human message. Errors propagate unmodified to the
//! calling boundary; only genuinely unexpected store/provider failures are
//! folded into the INTERNAL kind, logged with context and never echoed to
//! callers in detail.

use opsdesk_keycloak::KeycloakError;
use serde::Serialize;
use thiserror::Error;

/// The coarse error classes the calling boundary maps onto transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Forbidden,
    Internal,
}

/// Errors surfaced by the account services.
#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("The provided user ID is invalid.")]
    InvalidUserId,

    #[error("No user was found with the specified ID.")]
    UserNotFound,

    #[error("Logged in user is not provisioned in the directory.")]
    InvalidRequestUser,

    #[error("No manager was found with the specified ID.")]
    ManagerNotFound,

    #[error("No department was found with the specified ID.")]
    DepartmentNotFound,

    #[error("Same role cannot be assigned to the user.")]
    RoleMustDiffer,

    #[error("The manager has engineers assigned and cannot be removed.")]
    ManagerHasEngineers,

    #[error("The manager does not have a department assigned.")]
    DepartmentNotAssigned,

    #[error("departmentId is required when role is manager.")]
    DepartmentIdRequired,

    #[error("managerId is required when role is engineer.")]
    ManagerIdRequired,

    #[error("The specified role does not exist.")]
    RoleNotExist,

    #[error("Only managers and engineers can belong to a department.")]
    DepartmentNotAllowed,

    #[error("The user is not an engineer, so a manager cannot be assigned.")]
    ManagerCannotBeAssigned,

    #[error("A user cannot be their own reporting manager.")]
    SelfManagement,

    #[error("The provided status is invalid. Valid statuses are locked and active.")]
    InvalidStatus,

    #[error("User already exists in the identity provider.")]
    UserAlreadyExists,

    #[error("Department already exists. Try different department details.")]
    DepartmentExists,

    #[error("The department is currently in use and cannot be deleted.")]
    DepartmentInUse,

    #[error("The identity provider did not apply the requested role change.")]
    RoleSyncMismatch,

    #[error("Unable to trigger email for the provided user.")]
    EmailTrigger,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Identity provider error: {0}")]
    IdentityProvider(#[source] KeycloakError),
}

impl AccountsError {
    /// The coarse error class.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountsError::InvalidUserId
            | AccountsError::InvalidRequestUser
            | AccountsError::RoleMustDiffer
            | AccountsError::DepartmentNotAssigned
            | AccountsError::DepartmentIdRequired
            | AccountsError::ManagerIdRequired
            | AccountsError::RoleNotExist
            | AccountsError::DepartmentNotAllowed
            | AccountsError::ManagerCannotBeAssigned
            | AccountsError::SelfManagement
            | AccountsError::InvalidStatus => ErrorKind::BadRequest,

            AccountsError::UserNotFound
            | AccountsError::ManagerNotFound
            | AccountsError::DepartmentNotFound => ErrorKind::NotFound,

            AccountsError::ManagerHasEngineers
            | AccountsError::UserAlreadyExists
            | AccountsError::DepartmentExists
            | AccountsError::DepartmentInUse => ErrorKind::Conflict,

            AccountsError::RoleSyncMismatch
            | AccountsError::EmailTrigger
            | AccountsError::Database(_)
            | AccountsError::IdentityProvider(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine code for programmatic handling.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            AccountsError::InvalidUserId => "INVALID_USERID",
            AccountsError::UserNotFound => "USER_NOT_FOUND",
            AccountsError::InvalidRequestUser => "INVALID_REQUEST_USERID",
            AccountsError::ManagerNotFound => "MANAGER_NOT_FOUND",
            AccountsError::DepartmentNotFound => "DEPT_NOT_FOUND",
            AccountsError::RoleMustDiffer => "ROLE_MUST_DIFFERENT",
            AccountsError::ManagerHasEngineers => "MANAGER_HAS_ENGINEER",
            AccountsError::DepartmentNotAssigned => "DEPARTMENT_NOT_ASSIGNED",
            AccountsError::DepartmentIdRequired => "DEPARTMENT_ID_REQUIRED",
            AccountsError::ManagerIdRequired => "MANAGER_ID_REQUIRED",
            AccountsError::RoleNotExist => "ROLE_NOT_EXIST",
            AccountsError::DepartmentNotAllowed => "DEPARTMENT_NOT_ALLOWED",
            AccountsError::ManagerCannotBeAssigned => "MANAGER_CANNOT_BE_ASSIGNED",
            AccountsError::SelfManagement => "SELF_MANAGEMENT",
            AccountsError::InvalidStatus => "INVALID_STATUS",
            AccountsError::UserAlreadyExists => "USER_EXIST",
            AccountsError::DepartmentExists => "DEPT_EXIST",
            AccountsError::DepartmentInUse => "DEPT_IN_USE",
            AccountsError::RoleSyncMismatch => "ROLE_SYNC_MISMATCH",
            AccountsError::EmailTrigger => "EMAIL_TRIGGER",
            AccountsError::Database(_) | AccountsError::IdentityProvider(_) => {
                "INTERNAL_SERVER_ERROR"
            }
        }
    }

    /// The `{code, message}` pair callers receive. Internal failures carry a
    /// generic message; the detail stays in the logs.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let message = match self.kind() {
            ErrorKind::Internal => {
                "An unexpected error occurred on the server. Please try again later.".to_string()
            }
            _ => self.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

/// Caller-visible error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<KeycloakError> for AccountsError {
    fn from(err: KeycloakError) -> Self {
        match err {
            KeycloakError::Conflict(_) => AccountsError::UserAlreadyExists,
            KeycloakError::RoleNotFound(_) => AccountsError::RoleNotExist,
            other => AccountsError::IdentityProvider(other),
        }
    }
}

impl From<opsdesk_core::ParseIdError> for AccountsError {
    fn from(_: opsdesk_core::ParseIdError) -> Self {
        AccountsError::InvalidUserId
    }
}

impl From<opsdesk_core::ParseEnumError> for AccountsError {
    fn from(err: opsdesk_core::ParseEnumError) -> Self {
        match err.kind {
            "status" => AccountsError::InvalidStatus,
            _ => AccountsError::RoleNotExist,
        }
    }
}
