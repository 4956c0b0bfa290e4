use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{TraxError, TraxResult};

pub const DEFAULT_CONFIG_NAME: &str = "trax.config.json";

/// When refresh-batch notifications run relative to the flush that collects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchMode {
    /// Watchers run inside the flush microtask.
    #[default]
    Immediate,
    /// Watchers run in a follow-up microtask queued by the flush.
    Deferred,
}

/// Runtime configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default)]
    pub dispatch: DispatchMode,

    /// Upper bound on microtasks run by a single drain
    #[serde(default = "default_microtask_limit")]
    pub microtask_limit: usize,
}

fn default_microtask_limit() -> usize {
    10_000
}

impl RuntimeConfig {
    /// Load config from a directory, falling back to defaults when absent
    pub fn load(dir: impl AsRef<Path>) -> TraxResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(RuntimeConfig::default())
        }
    }

    pub fn from_json(source: &str) -> TraxResult<Self> {
        let config: RuntimeConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TraxResult<()> {
        if self.microtask_limit == 0 {
            return Err(TraxError::InvalidConfig(
                "microtaskLimit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            microtask_limit: default_microtask_limit(),
        }
    }
}
