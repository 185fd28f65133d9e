//! Session hub configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default per-connection outbound queue capacity.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;

/// Session hub configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Postgres connection URL. When absent or unreachable the hub falls
    /// back to in-memory session storage.
    /// Protected by `SecretString` to prevent accidental logging.
    pub database_url: Option<SecretString>,

    /// HS256 signing secret for room tokens.
    /// Protected by `SecretString` to prevent accidental logging.
    pub token_secret: SecretString,

    /// Per-connection outbound queue capacity (default: 256).
    pub send_queue_capacity: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_secret", &"[REDACTED]")
            .field("send_queue_capacity", &self.send_queue_capacity)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `HUB_TOKEN_SECRET` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `HUB_TOKEN_SECRET` is unset,
    /// or `ConfigError::InvalidValue` if `HUB_SEND_QUEUE_CAPACITY` is zero
    /// or unparseable.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_secret = SecretString::from(
            vars.get("HUB_TOKEN_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("HUB_TOKEN_SECRET".to_string()))?
                .clone(),
        );

        let database_url = vars
            .get("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .map(|url| SecretString::from(url.clone()));

        let bind_address = vars
            .get("HUB_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let send_queue_capacity = match vars.get("HUB_SEND_QUEUE_CAPACITY") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        "HUB_SEND_QUEUE_CAPACITY must be a positive integer, got {raw:?}"
                    ))
                })?,
            None => DEFAULT_SEND_QUEUE_CAPACITY,
        };

        Ok(Config {
            bind_address,
            database_url,
            token_secret,
            send_queue_capacity,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "HUB_TOKEN_SECRET".to_string(),
            "test-signing-secret".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(config.database_url.is_none());
        assert_eq!(config.token_secret.expose_secret(), "test-signing-secret");
        assert_eq!(config.send_queue_capacity, DEFAULT_SEND_QUEUE_CAPACITY);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("HUB_BIND_ADDRESS".to_string(), "127.0.0.1:9090".to_string());
        vars.insert(
            "DATABASE_URL".to_string(),
            "postgres://hub:pw@localhost/spinboard".to_string(),
        );
        vars.insert("HUB_SEND_QUEUE_CAPACITY".to_string(), "64".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9090");
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://hub:pw@localhost/spinboard"
        );
        assert_eq!(config.send_queue_capacity, 64);
    }

    #[test]
    fn test_from_vars_missing_token_secret() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "HUB_TOKEN_SECRET"));
    }

    #[test]
    fn test_empty_database_url_treated_as_absent() {
        let mut vars = base_vars();
        vars.insert("DATABASE_URL".to_string(), String::new());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_queue_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("HUB_SEND_QUEUE_CAPACITY".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        vars.insert("HUB_SEND_QUEUE_CAPACITY".to_string(), "lots".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert(
            "DATABASE_URL".to_string(),
            "postgres://hub:pw@localhost/spinboard".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgres://"));
        assert!(!debug_output.contains("test-signing-secret"));
    }
}
