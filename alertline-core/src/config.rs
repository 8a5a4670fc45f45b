use std::env;
use std::str::FromStr;

use crate::errors::{ConfigError, CoreError};

/// Default prefix for every alertline environment variable.
pub const ENV_PREFIX: &str = "ALERTLINE_";

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Process-wide configuration shared by the binaries and the engine runtime.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    pub log_level: String,
    pub default_tenant: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "info".to_string(),
            default_tenant: "default".to_string(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration from the process environment (`ALERTLINE_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Loads configuration from env vars prefixed with the provided value.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);
        let defaults = Self::default();

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::parse(&raw))
            .unwrap_or_default();
        let log_level = env::var(key("LOG_LEVEL")).unwrap_or(defaults.log_level);
        let default_tenant = env::var(key("DEFAULT_TENANT")).unwrap_or(defaults.default_tenant);

        if default_tenant.trim().is_empty() {
            return Err(ConfigError::InvalidEnvVar {
                key: key("DEFAULT_TENANT"),
                value: default_tenant,
            });
        }

        Ok(Self {
            environment,
            log_level,
            default_tenant,
        })
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

/// Reads and parses an optional environment variable.
///
/// Absent variables yield `Ok(None)`; present but unparsable values are an error.
pub fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Helper that loads config and converts to the canonical alertline error type.
pub fn load_core_config() -> Result<CoreConfig, CoreError> {
    Ok(CoreConfig::from_env()?)
}
