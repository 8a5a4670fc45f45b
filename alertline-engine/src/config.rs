use alertline_core::config::{parse_env, ENV_PREFIX};
use alertline_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Worker pool settings of the batch runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl BatchConfig {
    /// Reads `ALERTLINE_BATCH_WORKERS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(workers) = parse_env::<usize>(&format!("{prefix}BATCH_WORKERS"))? {
            config.workers = workers.max(1);
        }
        Ok(config)
    }
}
