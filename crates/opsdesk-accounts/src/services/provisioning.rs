//! Provisioning engine.
//!
//! `ensure_from_identity` runs on every authenticated inbound request after
//! token verification. It must be safe under concurrent first logins for the
//! same subject: the unique index on `sub`, not application-level locking, is
//! the sole correctness mechanism.

use crate::error::AccountsError;
use crate::models::{EnsureOutcome, IdentityClaims};
use crate::policy::effective_role;
use chrono::Utc;
use opsdesk_core::RequestContext;
use sqlx::PgPool;
use uuid::Uuid;

/// The idempotent "create or touch" step guaranteeing a local row exists for
/// the caller.
#[derive(Clone)]
pub struct ProvisioningService {
    pool: PgPool,
}

impl ProvisioningService {
    /// Create a new provisioning service.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensure a local row exists for the verified identity and touch its
    /// login bookkeeping.
    ///
    /// 1. Conflict-ignoring insert keyed by `sub`; a concurrent-login
    ///    conflict is the expected path, never an error.
    /// 2. Unconditional touch: `last_login_at` always, `first_login_at` and
    ///    each profile field only if still null (first-write-wins per field,
    ///    regardless of which request wins the insert race).
    /// 3. If the token carried role claims, refresh the cached `role` column
    ///    when it differs. The token is the provider's own assertion, so no
    ///    provider round-trip happens here.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::InvalidRequestUser`] for an empty subject and
    /// [`AccountsError::Database`] for store failures.
    pub async fn ensure_from_identity(
        &self,
        ctx: &RequestContext,
        claims: &IdentityClaims,
    ) -> Result<EnsureOutcome, AccountsError> {
        if claims.sub.trim().is_empty() {
            return Err(AccountsError::InvalidRequestUser);
        }

        let now = Utc::now();
        let initial_role = effective_role(&claims.roles);

        let inserted = sqlx::query(
            r"
            INSERT INTO users (sub, email, name, username, role, first_login_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (sub) DO NOTHING
            ",
        )
        .bind(&claims.sub)
        .bind(&claims.email)
        .bind(&claims.name)
        .bind(&claims.preferred_username)
        .bind(initial_role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        // The row lock serializes concurrent touches; `prev.first_login_at`
        // tells us whether this call is the one that stamped it, without
        // comparing wall-clock values in application code.
        let row: Option<(Uuid, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
            r"
            WITH prev AS (
                SELECT id, first_login_at FROM users WHERE sub = $1 FOR UPDATE
            )
            UPDATE users u
               SET last_login_at = $2,
                   first_login_at = COALESCE(u.first_login_at, $2),
                   email = COALESCE(u.email, $3),
                   name = COALESCE(u.name, $4),
                   username = COALESCE(u.username, $5),
                   updated_at = $2
              FROM prev
             WHERE u.id = prev.id
             RETURNING u.id, prev.first_login_at
            ",
        )
        .bind(&claims.sub)
        .bind(now)
        .bind(&claims.email)
        .bind(&claims.name)
        .bind(&claims.preferred_username)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, prev_first_login) =
            row.ok_or(AccountsError::Database(sqlx::Error::RowNotFound))?;

        let is_first_login = inserted || prev_first_login.is_none();

        if !claims.roles.is_empty() {
            let refreshed = sqlx::query(
                "UPDATE users SET role = $2, updated_at = $3 WHERE sub = $1 AND role <> $2",
            )
            .bind(&claims.sub)
            .bind(initial_role.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if refreshed > 0 {
                tracing::info!(
                    request_id = %ctx.request_id,
                    user_id = %user_id,
                    role = %initial_role,
                    "Refreshed cached role from token claims"
                );
            }
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            user_id = %user_id,
            is_first_login,
            "Ensured user from identity"
        );

        Ok(EnsureOutcome {
            user_id,
            is_first_login,
        })
    }
}
