use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregator::LookupPolicy;

/// Upper bound for any configured delay
const MAX_DELAY_MS: u64 = 60 * 60 * 1000;

/// Tunables for the chat client, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Quiet interval before a search is issued
    pub debounce_ms: u64,
    /// Upper bound for a single remote lookup
    pub lookup_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            debounce_ms: 500,
            lookup_timeout_ms: 5_000,
            max_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl ClientConfig {
    /// Load the config from `path`, or from the default location when `path` is `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        info!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.lookup_timeout_ms == 0 {
            return Err(anyhow!("lookup_timeout_ms must be positive"));
        }
        for (name, value) in [
            ("debounce_ms", self.debounce_ms),
            ("lookup_timeout_ms", self.lookup_timeout_ms),
            ("retry_backoff_ms", self.retry_backoff_ms),
        ] {
            if value > MAX_DELAY_MS {
                return Err(anyhow!("{} must be at most {}", name, MAX_DELAY_MS));
            }
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn lookup_policy(&self) -> LookupPolicy {
        LookupPolicy {
            lookup_timeout: self.lookup_timeout(),
            max_attempts: self.max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("chatdeck");
    Ok(config_dir)
}

fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}
