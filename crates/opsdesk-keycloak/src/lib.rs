//! Keycloak admin client.
//!
//! Wraps the Keycloak admin REST API behind the narrow capability surface the
//! account services need: authenticate as the service account, list realm
//! roles, replace a user's realm-role assignment, create/enable/delete users,
//! and trigger the onboarding email.
//!
//! The service-account token and the realm-role catalog are cached with a
//! bounded TTL; concurrent refreshes of an expired entry collapse into a
//! single in-flight fetch per process.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::KeycloakClient;
pub use config::{ConfigError, KeycloakConfig};
pub use error::KeycloakError;
pub use models::{NewRemoteUser, RealmRole, RemoteUser};
