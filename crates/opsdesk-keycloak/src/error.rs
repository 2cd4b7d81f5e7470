//! Error types for the Keycloak admin client.

use thiserror::Error;

/// Errors surfaced by the Keycloak admin client.
#[derive(Debug, Error)]
pub enum KeycloakError {
    /// The client could not be constructed from its configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The service-account token could not be obtained.
    #[error("Service authentication failed: {0}")]
    AuthFailed(String),

    /// The remote resource does not exist (HTTP 404).
    #[error("Remote resource not found: {0}")]
    NotFound(String),

    /// The remote resource already exists (HTTP 409).
    #[error("Remote resource already exists: {0}")]
    Conflict(String),

    /// A role name was not present in the realm's role catalog.
    #[error("Role '{0}' does not exist in the realm")]
    RoleNotFound(String),

    /// Transport-level failure (after the single transient retry).
    #[error("Keycloak request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response body could not be parsed.
    #[error("Failed to parse Keycloak response: {0}")]
    ParseError(String),

    /// Any other non-success status.
    #[error("Keycloak returned HTTP {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// Whether a transport error is in the connection-reset class that warrants
/// the single fresh-socket retry. Anything else propagates immediately.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}
