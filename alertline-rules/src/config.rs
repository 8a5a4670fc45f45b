use alertline_core::config::{parse_env, ENV_PREFIX};
use alertline_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Tunables of the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// How far back `current` looks for the latest observation.
    #[serde(default = "default_current_lookback_days")]
    pub current_lookback_days: u32,
    /// Extra attempts after a trigger-history write conflict.
    #[serde(default = "default_max_admit_retries")]
    pub max_admit_retries: u32,
}

fn default_current_lookback_days() -> u32 {
    365
}

fn default_max_admit_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            current_lookback_days: default_current_lookback_days(),
            max_admit_retries: default_max_admit_retries(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ALERTLINE_CURRENT_LOOKBACK_DAYS` and
    /// `ALERTLINE_MAX_ADMIT_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(days) = parse_env::<u32>(&format!("{prefix}CURRENT_LOOKBACK_DAYS"))? {
            config.current_lookback_days = days.max(1);
        }
        if let Some(retries) = parse_env::<u32>(&format!("{prefix}MAX_ADMIT_RETRIES"))? {
            config.max_admit_retries = retries;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        std::env::set_var("ALERTLINE_CFG_TEST_MAX_ADMIT_RETRIES", "7");
        let config = EngineConfig::from_env_with_prefix("ALERTLINE_CFG_TEST_").expect("config");
        assert_eq!(config.max_admit_retries, 7);
        assert_eq!(config.current_lookback_days, 365);
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"current_lookback_days": 30}"#).expect("parse");
        assert_eq!(config.current_lookback_days, 30);
        assert_eq!(config.max_admit_retries, 3);
    }
}
