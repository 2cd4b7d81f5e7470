//! Mutation engine.
//!
//! Guarded state transitions over the user graph. Every operation loads the
//! current row fresh, re-validates its preconditions against store state,
//! applies the change, and returns the row shaped for the acting user.
//! Operations that touch the identity provider commit locally only after the
//! remote side confirmed — the two stores must not diverge.

use crate::error::AccountsError;
use crate::models::{
    BulkReassignResult, EnsureOutcome, IdentityClaims, InviteUserRequest, RoleInfo,
    UpdateSelfRequest, UserView,
};
use crate::services::{load_refs, ProvisioningService};
use chrono::Utc;
use opsdesk_core::{AccountStatus, RequestContext, Role};
use opsdesk_db::{Department, User};
use opsdesk_keycloak::{KeycloakClient, NewRemoteUser};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Privileged directory mutations. The excluded gateway only routes admins
/// here, so mutation results are shaped with the admin view; self-service
/// operations shape with the target's own role.
#[derive(Clone)]
pub struct AdminService {
    pool: PgPool,
    keycloak: Arc<KeycloakClient>,
    provisioning: ProvisioningService,
}

impl AdminService {
    /// Create a new mutation service.
    #[must_use]
    pub fn new(pool: PgPool, keycloak: Arc<KeycloakClient>) -> Self {
        let provisioning = ProvisioningService::new(pool.clone());
        Self {
            pool,
            keycloak,
            provisioning,
        }
    }

    async fn load_user(&self, id: Uuid) -> Result<User, AccountsError> {
        User::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccountsError::UserNotFound)
    }

    async fn shaped(&self, user: &User, viewer: Role) -> Result<UserView, AccountsError> {
        let (department, manager) = load_refs(&self.pool, user).await?;
        Ok(UserView::shape(user, department, manager, viewer))
    }

    /// Self-service profile update: name and phone only.
    ///
    /// The patch type rejects privileged keys at deserialization, so this
    /// method never sees them.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::UserNotFound`] for an unknown id.
    pub async fn update_self(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        patch: &UpdateSelfRequest,
    ) -> Result<UserView, AccountsError> {
        self.load_user(id).await?;

        let user: User = sqlx::query_as(
            r"
            UPDATE users
               SET name = COALESCE($2, name),
                   phone = COALESCE($3, phone),
                   updated_at = $4
             WHERE id = $1
             RETURNING *
            ",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.phone)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(request_id = %ctx.request_id, user_id = %user.id, "Updated own profile");

        self.shaped(&user, user.role()).await
    }

    /// Lock or unlock an account. Locking stores the reason (empty string if
    /// omitted); unlocking clears it unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::UserNotFound`] for an unknown id.
    pub async fn change_status(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        status: AccountStatus,
        reason: Option<String>,
    ) -> Result<UserView, AccountsError> {
        self.load_user(id).await?;

        let locked_reason = match status {
            AccountStatus::Locked => Some(reason.unwrap_or_default()),
            AccountStatus::Active => None,
        };

        let user: User = sqlx::query_as(
            r"
            UPDATE users
               SET status = $2, locked_reason = $3, updated_at = $4
             WHERE id = $1
             RETURNING *
            ",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&locked_reason)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.id,
            status = %status,
            "Changed account status"
        );

        self.shaped(&user, Role::Admin).await
    }

    /// Move a user into a department. Only managers and engineers may hold
    /// one; the department must exist.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::DepartmentNotFound`],
    /// [`AccountsError::UserNotFound`] or
    /// [`AccountsError::DepartmentNotAllowed`].
    pub async fn update_department(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        department_id: Uuid,
    ) -> Result<UserView, AccountsError> {
        let department = Department::find_by_id(&self.pool, department_id)
            .await?
            .ok_or(AccountsError::DepartmentNotFound)?;

        let user = self.load_user(id).await?;
        if !user.role().may_hold_department() {
            return Err(AccountsError::DepartmentNotAllowed);
        }

        let user: User = sqlx::query_as(
            "UPDATE users SET department_id = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(department.id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.id,
            department_id = %department.id,
            "Reassigned department"
        );

        self.shaped(&user, Role::Admin).await
    }

    /// Point an engineer at a new reporting manager. The engineer's
    /// department always follows the manager's department; the two cannot
    /// diverge.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::SelfManagement`],
    /// [`AccountsError::ManagerNotFound`],
    /// [`AccountsError::DepartmentNotAssigned`],
    /// [`AccountsError::UserNotFound`] or
    /// [`AccountsError::ManagerCannotBeAssigned`].
    pub async fn update_manager(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        manager_id: Uuid,
    ) -> Result<UserView, AccountsError> {
        if id == manager_id {
            return Err(AccountsError::SelfManagement);
        }

        let manager = User::find_by_id(&self.pool, manager_id)
            .await?
            .filter(|m| m.role() == Role::Manager)
            .ok_or(AccountsError::ManagerNotFound)?;
        let manager_department = manager
            .department_id
            .ok_or(AccountsError::DepartmentNotAssigned)?;

        let user = self.load_user(id).await?;
        if user.role() != Role::Engineer {
            return Err(AccountsError::ManagerCannotBeAssigned);
        }

        let user: User = sqlx::query_as(
            r"
            UPDATE users
               SET manager_id = $2, department_id = $3, updated_at = $4
             WHERE id = $1
             RETURNING *
            ",
        )
        .bind(id)
        .bind(manager.id)
        .bind(manager_department)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.id,
            manager_id = %manager.id,
            "Reassigned reporting manager"
        );

        self.shaped(&user, Role::Admin).await
    }

    /// Atomically reassign every engineer reporting to one manager to
    /// another, carrying the new manager's department along. One statement,
    /// never a per-row loop, so a failure cannot leave a half-migrated set.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::ManagerNotFound`] when either id does not
    /// resolve to a manager, or [`AccountsError::DepartmentNotAssigned`]
    /// when the new manager has no department.
    pub async fn bulk_update_manager(
        &self,
        ctx: &RequestContext,
        old_manager_id: Uuid,
        new_manager_id: Uuid,
    ) -> Result<BulkReassignResult, AccountsError> {
        let old_manager = User::find_by_id(&self.pool, old_manager_id)
            .await?
            .filter(|m| m.role() == Role::Manager)
            .ok_or(AccountsError::ManagerNotFound)?;
        let new_manager = User::find_by_id(&self.pool, new_manager_id)
            .await?
            .filter(|m| m.role() == Role::Manager)
            .ok_or(AccountsError::ManagerNotFound)?;
        let new_department = new_manager
            .department_id
            .ok_or(AccountsError::DepartmentNotAssigned)?;

        let affected = sqlx::query(
            r"
            UPDATE users
               SET manager_id = $2, department_id = $3, updated_at = $4
             WHERE manager_id = $1 AND role = 'engineer'
            ",
        )
        .bind(old_manager.id)
        .bind(new_manager.id)
        .bind(new_department)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::info!(
            request_id = %ctx.request_id,
            old_manager_id = %old_manager.id,
            new_manager_id = %new_manager.id,
            affected,
            "Bulk reassigned engineers"
        );

        Ok(BulkReassignResult { affected })
    }

    /// Replace a user's effective role.
    ///
    /// A manager with direct reports cannot be moved off the manager role,
    /// and a no-op change is rejected so caller bugs surface. The local row
    /// changes only after the identity provider confirmed the replacement
    /// and the resulting remote set actually contains the requested role.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::UserNotFound`],
    /// [`AccountsError::ManagerHasEngineers`],
    /// [`AccountsError::RoleMustDiffer`],
    /// [`AccountsError::RoleSyncMismatch`], or provider/store errors.
    pub async fn change_role(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        new_role: Role,
    ) -> Result<UserView, AccountsError> {
        let user = self.load_user(id).await?;
        let current = user.role();

        if current == Role::Manager && User::count_reports(&self.pool, user.id).await? > 0 {
            return Err(AccountsError::ManagerHasEngineers);
        }
        if new_role == current {
            return Err(AccountsError::RoleMustDiffer);
        }

        let resulting = self
            .keycloak
            .replace_user_roles(&user.sub, new_role)
            .await?;
        if !resulting.iter().any(|name| name == new_role.as_str()) {
            tracing::error!(
                request_id = %ctx.request_id,
                user_id = %user.id,
                requested = %new_role,
                resulting = ?resulting,
                "Identity provider returned a role set without the requested role"
            );
            return Err(AccountsError::RoleSyncMismatch);
        }

        // Linkages that are meaningless for the new role are dropped in the
        // same statement: manager unless engineer, department unless
        // manager/engineer.
        let user: User = sqlx::query_as(
            r"
            UPDATE users
               SET role = $2,
                   manager_id = CASE WHEN $2 = 'engineer' THEN manager_id ELSE NULL END,
                   department_id = CASE WHEN $2 IN ('manager', 'engineer')
                                        THEN department_id ELSE NULL END,
                   updated_at = $3
             WHERE id = $1
             RETURNING *
            ",
        )
        .bind(id)
        .bind(new_role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.id,
            from = %current,
            to = %new_role,
            "Changed role"
        );

        self.shaped(&user, Role::Admin).await
    }

    /// Delete a user, remote identity first. If the provider refuses, the
    /// local row stays untouched — no orphaned remote identity and no
    /// silently-undeleted local shadow.
    ///
    /// # Errors
    ///
    /// Returns [`AccountsError::UserNotFound`],
    /// [`AccountsError::ManagerHasEngineers`], or provider/store errors.
    pub async fn delete_user(&self, ctx: &RequestContext, id: Uuid) -> Result<bool, AccountsError> {
        let user = self.load_user(id).await?;

        if user.role() == Role::Manager && User::count_reports(&self.pool, user.id).await? > 0 {
            return Err(AccountsError::ManagerHasEngineers);
        }

        self.keycloak.delete_user(&user.sub).await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        tracing::info!(request_id = %ctx.request_id, user_id = %user.id, "Deleted user");

        Ok(true)
    }

    /// Invite a new user. All validation runs before the remote identity is
    /// created; the provider assigns the canonical subject id, the local row
    /// is seeded through the same idempotent upsert as provisioning, then the
    /// onboarding email goes out.
    ///
    /// # Errors
    ///
    /// Returns the linkage validation errors of the requested role,
    /// [`AccountsError::RoleNotExist`] for a role missing from the provider
    /// catalog, [`AccountsError::UserAlreadyExists`] on a remote conflict, or
    /// [`AccountsError::EmailTrigger`] when the onboarding email fails.
    pub async fn invite_user(
        &self,
        ctx: &RequestContext,
        data: &InviteUserRequest,
    ) -> Result<UserView, AccountsError> {
        self.keycloak
            .find_role(data.role)
            .await?
            .ok_or(AccountsError::RoleNotExist)?;

        let (department_id, manager_id) = match data.role {
            Role::Manager => {
                let department_id = data
                    .department_id
                    .ok_or(AccountsError::DepartmentIdRequired)?;
                Department::find_by_id(&self.pool, department_id)
                    .await?
                    .ok_or(AccountsError::DepartmentNotFound)?;
                (Some(department_id), None)
            }
            Role::Engineer => {
                let manager_id = data.manager_id.ok_or(AccountsError::ManagerIdRequired)?;
                let manager = User::find_by_id(&self.pool, manager_id)
                    .await?
                    .filter(|m| m.role() == Role::Manager)
                    .ok_or(AccountsError::ManagerNotFound)?;
                let department_id = manager
                    .department_id
                    .ok_or(AccountsError::DepartmentNotAssigned)?;
                (Some(department_id), Some(manager.id))
            }
            Role::Admin | Role::User => (None, None),
        };

        let remote = self
            .keycloak
            .create_user(&NewRemoteUser::from_invite(
                &data.first_name,
                &data.last_name,
                &data.email,
            ))
            .await?;

        self.keycloak
            .replace_user_roles(&remote.id, data.role)
            .await?;

        let claims = IdentityClaims {
            sub: remote.id.clone(),
            email: Some(data.email.clone()),
            name: remote.display_name(),
            preferred_username: remote.username.clone(),
            roles: vec![data.role.as_str().to_string()],
        };
        let EnsureOutcome { user_id, .. } = self
            .provisioning
            .ensure_from_identity(ctx, &claims)
            .await?;

        let user: User = sqlx::query_as(
            r"
            UPDATE users
               SET department_id = $2, manager_id = $3, updated_at = $4
             WHERE id = $1
             RETURNING *
            ",
        )
        .bind(user_id)
        .bind(department_id)
        .bind(manager_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        self.keycloak
            .send_onboarding_email(&remote.id)
            .await
            .map_err(|err| {
                tracing::error!(
                    request_id = %ctx.request_id,
                    user_id = %user.id,
                    error = %err,
                    "Failed to trigger onboarding email"
                );
                AccountsError::EmailTrigger
            })?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %user.id,
            role = %data.role,
            "Invited user"
        );

        self.shaped(&user, Role::Admin).await
    }

    /// The realm-role catalog as the admin UI consumes it.
    ///
    /// # Errors
    ///
    /// Returns provider errors wrapped into the INTERNAL kind.
    pub async fn list_roles(&self) -> Result<Vec<RoleInfo>, AccountsError> {
        let roles = self.keycloak.list_realm_roles().await?;
        Ok(roles
            .into_iter()
            .map(|r| RoleInfo {
                id: r.id,
                name: r.name,
                description: r.description,
            })
            .collect())
    }
}
