//! Keycloak connection configuration.

/// Configuration for the Keycloak admin client.
#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server, e.g. `https://sso.example.com`.
    pub server_url: String,

    /// Realm the directory users live in.
    pub realm: String,

    /// Service-account client id.
    pub client_id: String,

    /// Service-account client secret.
    pub client_secret: String,

    /// Per-request timeout in seconds. Default: 8.
    pub timeout_secs: u64,
}

impl KeycloakConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] when a required variable is absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] when a required variable is absent
    /// and [`ConfigError::InvalidValue`] when a value fails to parse.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let server_url = reader("KEYCLOAK_SERVER_URL")
            .map_err(|_| ConfigError::MissingVar("KEYCLOAK_SERVER_URL".into()))?;

        let realm = reader("KEYCLOAK_REALM")
            .map_err(|_| ConfigError::MissingVar("KEYCLOAK_REALM".into()))?;

        let client_id = reader("KEYCLOAK_CLIENT_ID")
            .map_err(|_| ConfigError::MissingVar("KEYCLOAK_CLIENT_ID".into()))?;

        let client_secret = reader("KEYCLOAK_CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingVar("KEYCLOAK_CLIENT_SECRET".into()))?;

        let timeout_secs = reader("KEYCLOAK_TIMEOUT_SECS")
            .unwrap_or_else(|_| "8".to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue("KEYCLOAK_TIMEOUT_SECS".into(), e.to_string()))?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            realm,
            client_id,
            client_secret,
            timeout_secs,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
