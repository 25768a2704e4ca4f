//! YAML configuration file on disk.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::domain::config::{UnirunConfig, validate_config};

/// Reads `~/.unirun/config.yaml`, or the file named by `UNIRUN_CONFIG`.
pub struct YamlConfigStore;

impl YamlConfigStore {
    /// Load and validate the configuration. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(&self) -> Result<UnirunConfig> {
        let path = self.path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(UnirunConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config: UnirunConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var("UNIRUN_CONFIG") {
            return Ok(PathBuf::from(val));
        }
        Ok(unirun_home()?.join("config.yaml"))
    }
}

/// Runtime directory for per-instance state: the configured one, else
/// `~/.unirun/runtime`.
///
/// # Errors
///
/// Returns an error if no directory is configured and the home directory
/// cannot be determined.
pub fn runtime_dir(config: &UnirunConfig) -> Result<PathBuf> {
    match &config.runtime_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(unirun_home()?.join("runtime")),
    }
}

fn unirun_home() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".unirun"))
}
