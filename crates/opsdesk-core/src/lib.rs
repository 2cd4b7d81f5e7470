//! opsdesk Core Library
//!
//! Shared types for the opsdesk account-management services.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`UserId`, `DepartmentId`)
//! - [`roles`] - The closed role and account-status enumerations
//! - [`context`] - Explicit per-request context threaded through service calls

pub mod context;
pub mod ids;
pub mod roles;

pub use context::RequestContext;
pub use ids::{DepartmentId, ParseIdError, UserId};
pub use roles::{AccountStatus, ParseEnumError, Role};
