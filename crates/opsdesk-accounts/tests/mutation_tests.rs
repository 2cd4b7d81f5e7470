//! Integration tests for the mutation engine.
//!
//! Store state comes from a real database; the identity provider is a
//! wiremock server so remote-first ordering is observable.
//!
//! Run with: `cargo test -p opsdesk-accounts mutation -- --ignored`

mod common;

use common::*;
use opsdesk_accounts::models::{InviteUserRequest, UpdateSelfRequest};
use opsdesk_accounts::AdminService;
use opsdesk_core::{AccountStatus, RequestContext, Role};
use opsdesk_keycloak::{KeycloakClient, KeycloakConfig};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn keycloak_for(server: &MockServer) -> Arc<KeycloakClient> {
    Arc::new(
        KeycloakClient::new(KeycloakConfig {
            server_url: server.uri(),
            realm: "opsdesk".to_string(),
            client_id: "opsdesk-svc".to_string(),
            client_secret: "secret".to_string(),
            timeout_secs: 8,
        })
        .expect("client builds"),
    )
}

/// Token endpoint expecting a fixed number of fetches. Mount with
/// `expected = 0` to prove an operation never reached the provider.
async fn mount_token(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/realms/opsdesk/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "svc-token",
            "expires_in": 300,
        })))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_role_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/admin/realms/opsdesk/roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "r-adm", "name": "admin" },
            { "id": "r-mgr", "name": "manager" },
            { "id": "r-eng", "name": "engineer" },
            { "id": "r-usr", "name": "user" },
        ])))
        .mount(server)
        .await;
}

/// Mount the full replace-roles exchange for one user, ending at `final_role`.
async fn mount_role_replacement(server: &MockServer, sub: &str, final_role: &str) {
    let mappings = format!("/admin/realms/opsdesk/users/{sub}/role-mappings/realm");

    Mock::given(method("GET"))
        .and(path(mappings.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "r-def", "name": "default-roles-opsdesk" },
        ])))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(mappings.clone()))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(mappings))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "r-x", "name": final_role },
            { "id": "r-def", "name": "default-roles-opsdesk" },
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn update_self_touches_profile_fields_only() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    let user = seed_user(&pool, "engineer").await;

    let patch = UpdateSelfRequest {
        name: Some("New Name".to_string()),
        phone: Some("+6012481278".to_string()),
    };
    let view = service.update_self(&ctx, user.id, &patch).await.unwrap();
    assert_eq!(view.name.as_deref(), Some("New Name"));
    assert_eq!(view.phone.as_deref(), Some("+6012481278"));

    let row = load_user(&pool, user.id).await;
    assert_eq!(row.role, "engineer");
    assert_eq!(row.status, "active");

    cleanup_users(&pool, &[user.id]).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn lock_stores_reason_and_unlock_clears_it() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    let user = seed_user(&pool, "user").await;

    let view = service
        .change_status(
            &ctx,
            user.id,
            AccountStatus::Locked,
            Some("Violating policy".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(view.status, AccountStatus::Locked);
    assert_eq!(view.locked_reason.as_deref(), Some("Violating policy"));

    // Locking without a reason stores an empty string, not null
    service
        .change_status(&ctx, user.id, AccountStatus::Locked, None)
        .await
        .unwrap();
    assert_eq!(
        load_user(&pool, user.id).await.locked_reason.as_deref(),
        Some("")
    );

    // Unlocking clears the reason unconditionally
    let view = service
        .change_status(&ctx, user.id, AccountStatus::Active, None)
        .await
        .unwrap();
    assert_eq!(view.status, AccountStatus::Active);
    assert!(load_user(&pool, user.id).await.locked_reason.is_none());

    cleanup_users(&pool, &[user.id]).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn department_assignment_guards() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();
    let mk = unique_marker();

    let dept = seed_department(&pool, &format!("{mk}-ENG"), "Engineering").await;
    let engineer = seed_user(&pool, "engineer").await;
    let admin = seed_user(&pool, "admin").await;

    // Unknown department
    let err = service
        .update_department(&ctx, engineer.id, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DEPT_NOT_FOUND");

    // Admins and plain users may not hold a department
    let err = service
        .update_department(&ctx, admin.id, dept)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DEPARTMENT_NOT_ALLOWED");

    // Engineers may
    let view = service
        .update_department(&ctx, engineer.id, dept)
        .await
        .unwrap();
    assert_eq!(view.department.as_ref().unwrap().id, dept);

    cleanup_users(&pool, &[engineer.id, admin.id]).await;
    cleanup_department(&pool, dept).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn manager_assignment_guards_and_department_follow() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();
    let mk = unique_marker();

    let old_dept = seed_department(&pool, &format!("{mk}-OLD"), "Old").await;
    let new_dept = seed_department(&pool, &format!("{mk}-NEW"), "New").await;
    let deptless_manager = seed_user_full(&pool, None, "manager", "active", None, None).await;
    let manager = seed_user_full(&pool, None, "manager", "active", Some(new_dept), None).await;
    let engineer =
        seed_user_full(&pool, None, "engineer", "active", Some(old_dept), None).await;
    let plain = seed_user(&pool, "user").await;

    // Self-management
    let err = service
        .update_manager(&ctx, manager.id, manager.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SELF_MANAGEMENT");

    // Candidate manager without a department
    let err = service
        .update_manager(&ctx, engineer.id, deptless_manager.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DEPARTMENT_NOT_ASSIGNED");

    // Candidate that is not a manager at all
    let err = service
        .update_manager(&ctx, engineer.id, plain.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MANAGER_NOT_FOUND");

    // Target that is not an engineer
    let err = service
        .update_manager(&ctx, plain.id, manager.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MANAGER_CANNOT_BE_ASSIGNED");

    // Success: manager set and department copied from the manager
    let view = service
        .update_manager(&ctx, engineer.id, manager.id)
        .await
        .unwrap();
    assert_eq!(view.reporting_manager.as_ref().unwrap().id, manager.id);
    assert_eq!(view.department.as_ref().unwrap().id, new_dept);

    cleanup_users(&pool, &[engineer.id, manager.id, deptless_manager.id, plain.id]).await;
    cleanup_department(&pool, old_dept).await;
    cleanup_department(&pool, new_dept).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn bulk_reassignment_is_one_statement_and_zero_is_not_an_error() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();
    let mk = unique_marker();

    let dept_a = seed_department(&pool, &format!("{mk}-A"), "A").await;
    let dept_b = seed_department(&pool, &format!("{mk}-B"), "B").await;
    let old_manager = seed_user_full(&pool, None, "manager", "active", Some(dept_a), None).await;
    let new_manager = seed_user_full(&pool, None, "manager", "active", Some(dept_b), None).await;

    // Nothing reports to old_manager yet
    let result = service
        .bulk_update_manager(&ctx, old_manager.id, new_manager.id)
        .await
        .unwrap();
    assert_eq!(result.affected, 0);

    let eng_1 =
        seed_user_full(&pool, None, "engineer", "active", Some(dept_a), Some(old_manager.id))
            .await;
    let eng_2 =
        seed_user_full(&pool, None, "engineer", "active", Some(dept_a), Some(old_manager.id))
            .await;

    let result = service
        .bulk_update_manager(&ctx, old_manager.id, new_manager.id)
        .await
        .unwrap();
    assert_eq!(result.affected, 2);

    for id in [eng_1.id, eng_2.id] {
        let row = load_user(&pool, id).await;
        assert_eq!(row.manager_id, Some(new_manager.id));
        assert_eq!(row.department_id, Some(dept_b));
    }

    cleanup_users(&pool, &[eng_1.id, eng_2.id, old_manager.id, new_manager.id]).await;
    cleanup_department(&pool, dept_a).await;
    cleanup_department(&pool, dept_b).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn role_change_guards_fire_before_the_provider_is_called() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    // expect(0): neither guard path may reach the token endpoint
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    let manager = seed_user(&pool, "manager").await;
    let engineer =
        seed_user_full(&pool, None, "engineer", "active", None, Some(manager.id)).await;

    // A manager with reports cannot change role
    let err = service
        .change_role(&ctx, manager.id, Role::User)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MANAGER_HAS_ENGINEER");
    assert_eq!(err.kind(), opsdesk_accounts::ErrorKind::Conflict);

    // No-op changes are rejected, not silently accepted
    let err = service
        .change_role(&ctx, engineer.id, Role::Engineer)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_MUST_DIFFERENT");

    cleanup_users(&pool, &[engineer.id, manager.id]).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn role_change_commits_locally_only_after_remote_confirms() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_role_catalog(&server).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();
    let mk = unique_marker();

    let dept = seed_department(&pool, &format!("{mk}-ENG"), "Engineering").await;
    let manager = seed_user_full(&pool, None, "manager", "active", Some(dept), None).await;
    let user =
        seed_user_full(&pool, None, "engineer", "active", Some(dept), Some(manager.id)).await;
    mount_role_replacement(&server, &user.sub, "user").await;

    let view = service.change_role(&ctx, user.id, Role::User).await.unwrap();
    assert_eq!(view.role, Role::User);

    // Linkages meaningless for the new role were dropped in the same write
    let row = load_user(&pool, user.id).await;
    assert_eq!(row.role, "user");
    assert!(row.manager_id.is_none());
    assert!(row.department_id.is_none());

    cleanup_users(&pool, &[user.id, manager.id]).await;
    cleanup_department(&pool, dept).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn role_change_mismatch_leaves_local_row_unchanged() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_role_catalog(&server).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    let user = seed_user(&pool, "user").await;
    // The provider "applies" the change but the read-back shows a different set
    mount_role_replacement(&server, &user.sub, "manager").await;

    let err = service
        .change_role(&ctx, user.id, Role::Engineer)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_SYNC_MISMATCH");
    assert_eq!(load_user(&pool, user.id).await.role, "user");

    cleanup_users(&pool, &[user.id]).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn delete_is_remote_first() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    // Remote refuses: the local row must survive untouched
    let doomed = seed_user(&pool, "user").await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/realms/opsdesk/users/{}", doomed.sub)))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let err = service.delete_user(&ctx, doomed.id).await.unwrap_err();
    assert_eq!(err.kind(), opsdesk_accounts::ErrorKind::Internal);
    assert_eq!(load_user(&pool, doomed.id).await.id, doomed.id);

    // Remote accepts: the local row goes with it
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/realms/opsdesk/users/{}", doomed.sub)))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert!(service.delete_user(&ctx, doomed.id).await.unwrap());
    assert!(opsdesk_db::User::find_by_id(&pool, doomed.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn delete_rejects_managers_with_reports() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    let manager = seed_user(&pool, "manager").await;
    let engineer =
        seed_user_full(&pool, None, "engineer", "active", None, Some(manager.id)).await;

    let err = service.delete_user(&ctx, manager.id).await.unwrap_err();
    assert_eq!(err.code(), "MANAGER_HAS_ENGINEER");
    assert_eq!(load_user(&pool, manager.id).await.id, manager.id);

    cleanup_users(&pool, &[engineer.id, manager.id]).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn invite_engineer_end_to_end() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_role_catalog(&server).await;
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();
    let mk = unique_marker();

    let dept = seed_department(&pool, &format!("{mk}-ENG"), "Engineering").await;
    let manager = seed_user_full(&pool, None, "manager", "active", Some(dept), None).await;

    let remote_id = format!("kc-{}", uuid::Uuid::new_v4());
    Mock::given(method("POST"))
        .and(path("/admin/realms/opsdesk/users"))
        .respond_with(ResponseTemplate::new(201).insert_header(
            "Location",
            format!("{}/admin/realms/opsdesk/users/{remote_id}", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/opsdesk/users/{remote_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": remote_id,
            "username": "john_doe",
            "email": "john.doe@example.com",
            "firstName": "John",
            "lastName": "Doe",
            "enabled": true,
        })))
        .mount(&server)
        .await;
    mount_role_replacement(&server, &remote_id, "engineer").await;
    Mock::given(method("PUT"))
        .and(path(format!(
            "/admin/realms/opsdesk/users/{remote_id}/execute-actions-email"
        )))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = InviteUserRequest {
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        email: "john.doe@example.com".to_string(),
        role: Role::Engineer,
        department_id: None,
        manager_id: Some(manager.id),
    };
    let view = service.invite_user(&ctx, &request).await.unwrap();

    assert_eq!(view.role, Role::Engineer);
    assert_eq!(view.status, AccountStatus::Active);
    assert_eq!(view.department.as_ref().unwrap().code, format!("{mk}-ENG"));
    assert_eq!(view.reporting_manager.as_ref().unwrap().id, manager.id);

    cleanup_user_by_sub(&pool, &remote_id).await;
    cleanup_users(&pool, &[manager.id]).await;
    cleanup_department(&pool, dept).await;
}

#[tokio::test]
#[ignore = "Requires database - run locally with DATABASE_URL"]
async fn invite_validation_runs_before_any_remote_identity_exists() {
    let pool = create_test_pool().await;
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_role_catalog(&server).await;
    // No POST /users mock mounted: reaching it would fail the run
    let service = AdminService::new(pool.clone(), keycloak_for(&server));
    let ctx = RequestContext::internal();

    let request = InviteUserRequest {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        email: unique_email(),
        role: Role::Manager,
        department_id: None,
        manager_id: None,
    };
    let err = service.invite_user(&ctx, &request).await.unwrap_err();
    assert_eq!(err.code(), "DEPARTMENT_ID_REQUIRED");

    let request = InviteUserRequest {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        email: unique_email(),
        role: Role::Engineer,
        department_id: None,
        manager_id: None,
    };
    let err = service.invite_user(&ctx, &request).await.unwrap_err();
    assert_eq!(err.code(), "MANAGER_ID_REQUIRED");
}
