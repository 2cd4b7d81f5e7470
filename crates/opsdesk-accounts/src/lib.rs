//! opsdesk Account Directory
//!
//! The role-scoped user directory and mutation engine behind the admin
//! backend. Every authenticated inbound call first passes through the
//! provisioning service (idempotent "ensure" step), then reads go to the
//! directory service and writes to the admin service; both consult the
//! role/visibility policy and the Keycloak client as needed.
//!
//! # Modules
//!
//! - [`policy`] - Pure role-priority and field-visibility rules
//! - [`services`] - Provisioning, directory queries, guarded mutations,
//!   department administration
//! - [`models`] - Request and response shapes at the service boundary
//! - [`error`] - The BAD_REQUEST / NOT_FOUND / CONFLICT / INTERNAL taxonomy

pub mod error;
pub mod models;
pub mod policy;
pub mod services;

pub use error::{AccountsError, ErrorBody, ErrorKind};
pub use services::{AdminService, DepartmentService, DirectoryService, ProvisioningService};
