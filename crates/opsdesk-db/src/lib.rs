//! opsdesk Database Layer
//!
//! Postgres-backed storage for the account directory. Entities live in
//! [`models`]; each carries its own query methods against a [`sqlx::PgPool`].
//!
//! # Modules
//!
//! - [`models`] - `User` and `Department` entities
//! - [`error`] - Unified database error type
//! - [`migrations`] - Embedded, versioned SQL migrations

pub mod error;
pub mod migrations;
pub mod models;

pub use error::DbError;
pub use migrations::run_migrations;
pub use models::{Department, User};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to Postgres with a bounded pool.
///
/// # Errors
///
/// Returns [`DbError::ConnectionFailed`] if the pool cannot be established.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)
}
