//! Wire models for the Keycloak admin API.

use serde::{Deserialize, Serialize};

/// A realm role from the provider's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmRole {
    /// Provider-side role id.
    pub id: String,
    /// Role name; only names in the known enumeration are surfaced.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A user record as Keycloak represents it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    /// The provider-assigned id; becomes the local `sub`.
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl RemoteUser {
    /// Display name in "First Last" form, when either part is present.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

/// Payload for creating a user in the realm.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRemoteUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub enabled: bool,
}

impl NewRemoteUser {
    /// Build the invite payload; the username is derived from the name parts,
    /// lowercased with spaces collapsed to underscores.
    #[must_use]
    pub fn from_invite(first_name: &str, last_name: &str, email: &str) -> Self {
        let username = format!("{first_name} {last_name}")
            .to_lowercase()
            .replace(' ', "_");
        Self {
            username,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            enabled: true,
        }
    }
}
