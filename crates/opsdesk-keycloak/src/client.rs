//! Keycloak admin REST client.
//!
//! All requests run with a bounded timeout. A request that fails with a
//! connection-reset-class transport error is retried exactly once on a fresh,
//! non-pooled connection; every other failure propagates immediately.

use crate::cache::TtlCache;
use crate::config::KeycloakConfig;
use crate::error::{is_transient, KeycloakError};
use crate::models::{NewRemoteUser, RealmRole, RemoteUser};
use opsdesk_core::Role;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Realm-role catalog cache TTL.
const ROLES_TTL: Duration = Duration::from_secs(120);

/// Token lifetime safety margin and floor, in seconds. The cached token
/// expires `MARGIN` seconds before the provider says it does, but never lives
/// less than `FLOOR` seconds.
const TOKEN_TTL_MARGIN_SECS: u64 = 15;
const TOKEN_TTL_FLOOR_SECS: u64 = 30;

/// Actions requested in the onboarding email.
const ONBOARDING_ACTIONS: [&str; 2] = ["VERIFY_EMAIL", "UPDATE_PASSWORD"];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Keycloak admin client with cached service-account credential and
/// realm-role catalog.
#[derive(Debug)]
pub struct KeycloakClient {
    config: KeycloakConfig,
    http: Client,
    token: TtlCache<String>,
    roles: TtlCache<Vec<RealmRole>>,
}

impl KeycloakClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::InvalidConfig`] if the HTTP client cannot be
    /// built.
    pub fn new(config: KeycloakConfig) -> Result<Self, KeycloakError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("opsdesk-keycloak/1.0")
            .build()
            .map_err(|e| KeycloakError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            token: TtlCache::new(),
            roles: TtlCache::new(),
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.config.server_url, self.config.realm
        )
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "{}/admin/realms/{}{}{}",
            self.config.server_url,
            self.config.realm,
            if path.starts_with('/') { "" } else { "/" },
            path
        )
    }

    /// Role names Keycloak manages itself; never removed during reassignment.
    fn reserved_roles(&self) -> [String; 2] {
        [
            format!("default-roles-{}", self.config.realm),
            "offline_access".to_string(),
        ]
    }

    // ── Request plumbing ──────────────────────────────────────────────

    /// Send a request, retrying once on a fresh connection for
    /// connection-reset-class errors only.
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, KeycloakError> {
        let request = builder.build()?;
        let retry_copy = request.try_clone();
        let method = request.method().clone();
        let url = request.url().clone();

        debug!(method = %method, url = %url, "keycloak request");

        match self.http.execute(request).await {
            Ok(response) => Ok(response),
            Err(err) if is_transient(&err) => {
                let Some(retry) = retry_copy else {
                    return Err(err.into());
                };
                warn!(
                    method = %method,
                    url = %url,
                    error = %err,
                    "keycloak request hit a transient network error, retrying on a fresh connection"
                );
                let fresh = Client::builder()
                    .timeout(Duration::from_secs(self.config.timeout_secs))
                    .pool_max_idle_per_host(0)
                    .build()
                    .map_err(|e| {
                        KeycloakError::InvalidConfig(format!("Failed to build retry client: {e}"))
                    })?;
                Ok(fresh.execute(retry).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, KeycloakError> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| KeycloakError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            Err(self.error_for(status, response).await)
        }
    }

    async fn error_for(&self, status: StatusCode, response: Response) -> KeycloakError {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        match status {
            StatusCode::UNAUTHORIZED => {
                // The cached service token is no longer accepted.
                self.token.invalidate().await;
                KeycloakError::AuthFailed(format!("Authentication failed (401): {body}"))
            }
            StatusCode::NOT_FOUND => KeycloakError::NotFound(body),
            StatusCode::CONFLICT => KeycloakError::Conflict(body),
            _ => KeycloakError::Unexpected {
                status: status.as_u16(),
                body,
            },
        }
    }

    async fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, KeycloakError> {
        let token = self.get_service_token().await?;
        Ok(builder.bearer_auth(token))
    }

    // ── Service-account token ─────────────────────────────────────────

    /// Get the cached service-account token, fetching a new one when expired.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::AuthFailed`] if the token endpoint rejects the
    /// client credentials.
    pub async fn get_service_token(&self) -> Result<String, KeycloakError> {
        self.token.get_or_fetch(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<(String, Duration), KeycloakError> {
        let builder = self.http.post(self.token_url()).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ]);

        let response = self.execute(builder).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(KeycloakError::AuthFailed(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| KeycloakError::AuthFailed(format!("Failed to parse token response: {e}")))?;

        let ttl_secs = token
            .expires_in
            .unwrap_or(60)
            .saturating_sub(TOKEN_TTL_MARGIN_SECS)
            .max(TOKEN_TTL_FLOOR_SECS);

        Ok((token.access_token, Duration::from_secs(ttl_secs)))
    }

    // ── Realm roles ───────────────────────────────────────────────────

    /// List the realm's role catalog, filtered to the known role enumeration.
    /// Cached with a short TTL; concurrent refreshes collapse to one fetch.
    ///
    /// # Errors
    ///
    /// Returns a [`KeycloakError`] if the catalog cannot be fetched.
    pub async fn list_realm_roles(&self) -> Result<Vec<RealmRole>, KeycloakError> {
        self.roles.get_or_fetch(|| self.fetch_roles()).await
    }

    async fn fetch_roles(&self) -> Result<(Vec<RealmRole>, Duration), KeycloakError> {
        let url = self.admin_url("/roles?briefRepresentation=true&first=0&max=200");
        let builder = self.authed(self.http.get(url)).await?;
        let response = self.execute(builder).await?;
        let roles: Vec<RealmRole> = self.handle_response(response).await?;

        let known: Vec<RealmRole> = roles
            .into_iter()
            .filter(|r| Role::from_claim(&r.name).is_some())
            .collect();

        Ok((known, ROLES_TTL))
    }

    /// Find a catalog role by its typed name.
    ///
    /// # Errors
    ///
    /// Returns a [`KeycloakError`] if the catalog cannot be fetched.
    pub async fn find_role(&self, role: Role) -> Result<Option<RealmRole>, KeycloakError> {
        let roles = self.list_realm_roles().await?;
        Ok(roles.into_iter().find(|r| r.name == role.as_str()))
    }

    /// Replace a user's realm-role assignment with exactly one role.
    ///
    /// Removes every current non-reserved realm role from the known
    /// enumeration, assigns the requested one, then re-reads the assignment
    /// and returns the resulting role names so the caller can verify the
    /// replacement took effect.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::RoleNotFound`] if the role is not in the
    /// catalog, or a transport/status error from any step.
    pub async fn replace_user_roles(
        &self,
        kc_user_id: &str,
        role: Role,
    ) -> Result<Vec<String>, KeycloakError> {
        let mappings_url = self.admin_url(&format!("/users/{kc_user_id}/role-mappings/realm"));
        let reserved = self.reserved_roles();

        let builder = self.authed(self.http.get(&mappings_url)).await?;
        let response = self.execute(builder).await?;
        let current: Vec<RealmRole> = self.handle_response(response).await?;

        let to_remove: Vec<RealmRole> = current
            .into_iter()
            .filter(|r| !reserved.contains(&r.name) && Role::from_claim(&r.name).is_some())
            .collect();

        if !to_remove.is_empty() {
            let builder = self
                .authed(self.http.delete(&mappings_url))
                .await?
                .json(&to_remove);
            let response = self.execute(builder).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(self.error_for(status, response).await);
            }
        }

        let required = self
            .find_role(role)
            .await?
            .ok_or_else(|| KeycloakError::RoleNotFound(role.as_str().to_string()))?;

        let builder = self
            .authed(self.http.post(&mappings_url))
            .await?
            .json(&[required]);
        let response = self.execute(builder).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.error_for(status, response).await);
        }

        let builder = self.authed(self.http.get(&mappings_url)).await?;
        let response = self.execute(builder).await?;
        let after: Vec<RealmRole> = self.handle_response(response).await?;

        let names: Vec<String> = after
            .into_iter()
            .filter(|r| Role::from_claim(&r.name).is_some())
            .map(|r| r.name.to_lowercase())
            .collect();

        debug!(kc_user_id, role = %role, roles = ?names, "replaced realm roles");
        Ok(names)
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Create a user in the realm and return the provider's record.
    ///
    /// The provider assigns the canonical subject id, parsed from the
    /// `Location` header of the create response.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::Conflict`] when the user already exists, or a
    /// transport/status error otherwise.
    pub async fn create_user(&self, user: &NewRemoteUser) -> Result<RemoteUser, KeycloakError> {
        let builder = self
            .authed(self.http.post(self.admin_url("/users")))
            .await?
            .json(user);
        let response = self.execute(builder).await?;
        let status = response.status();

        if !(status == StatusCode::CREATED || status == StatusCode::NO_CONTENT) {
            return Err(self.error_for(status, response).await);
        }

        let id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| loc.rsplit('/').next())
            .map(ToString::to_string)
            .ok_or_else(|| {
                KeycloakError::ParseError("Create response carried no Location header".to_string())
            })?;

        self.get_user(&id).await
    }

    /// Fetch a user by provider id.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::NotFound`] if the user does not exist.
    pub async fn get_user(&self, kc_user_id: &str) -> Result<RemoteUser, KeycloakError> {
        let builder = self
            .authed(self.http.get(self.admin_url(&format!("/users/{kc_user_id}"))))
            .await?;
        let response = self.execute(builder).await?;
        self.handle_response(response).await
    }

    /// Enable or disable a user.
    ///
    /// # Errors
    ///
    /// Returns a [`KeycloakError`] if the update is rejected.
    pub async fn set_enabled(&self, kc_user_id: &str, enabled: bool) -> Result<(), KeycloakError> {
        let builder = self
            .authed(self.http.put(self.admin_url(&format!("/users/{kc_user_id}"))))
            .await?
            .json(&serde_json::json!({ "enabled": enabled }));
        let response = self.execute(builder).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.error_for(status, response).await);
        }
        Ok(())
    }

    /// Trigger the onboarding lifecycle email (verify email, set password).
    ///
    /// # Errors
    ///
    /// Returns a [`KeycloakError`] unless the provider acknowledges with 204.
    pub async fn send_onboarding_email(&self, kc_user_id: &str) -> Result<(), KeycloakError> {
        let builder = self
            .authed(self.http.put(
                self.admin_url(&format!("/users/{kc_user_id}/execute-actions-email")),
            ))
            .await?
            .json(&ONBOARDING_ACTIONS);
        let response = self.execute(builder).await?;
        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(self.error_for(status, response).await);
        }
        Ok(())
    }

    /// Delete a user from the realm.
    ///
    /// # Errors
    ///
    /// Returns a [`KeycloakError`] if the provider refuses the delete; the
    /// caller must not remove local state in that case.
    pub async fn delete_user(&self, kc_user_id: &str) -> Result<bool, KeycloakError> {
        let builder = self
            .authed(
                self.http
                    .delete(self.admin_url(&format!("/users/{kc_user_id}"))),
            )
            .await?;
        let response = self.execute(builder).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.error_for(status, response).await);
        }
        debug!(kc_user_id, "deleted remote user");
        Ok(true)
    }
}
