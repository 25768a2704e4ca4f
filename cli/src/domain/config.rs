//! Domain types and validators for unirun configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.unirun/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct UnirunConfig {
    /// Where per-instance state directories are created.
    /// Defaults to `~/.unirun/runtime` when unset.
    pub runtime_dir: Option<PathBuf>,
    /// Never prompt, even on a terminal.
    pub no_prompt: bool,
    pub log: LogConfig,
    pub run: RunConfig,
    pub qemu: QemuConfig,
}

/// Diagnostic logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `unirun=debug`.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Instance run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Run without hardware acceleration.
    pub emulation: bool,
    /// Upper bound for each stop/delete call during cleanup.
    pub teardown_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            emulation: true,
            teardown_timeout_secs: 30,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}

/// QEMU backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QemuConfig {
    /// Prefix of the emulator binary; the architecture is appended.
    pub binary_prefix: String,
    /// Extra arguments appended to every invocation.
    pub extra_args: Vec<String>,
    /// Oldest supported QEMU release.
    pub min_version: String,
}

impl Default for QemuConfig {
    fn default() -> Self {
        Self {
            binary_prefix: "qemu-system-".to_string(),
            extra_args: Vec::new(),
            min_version: "4.2.0".to_string(),
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validate a loaded configuration.
///
/// # Errors
///
/// Returns an error for an unknown log format, a zero teardown timeout, or
/// a malformed minimum QEMU version.
pub fn validate_config(config: &UnirunConfig) -> Result<()> {
    if !VALID_LOG_FORMATS.contains(&config.log.format.as_str()) {
        return Err(ConfigError::InvalidValue {
            key: "log.format".to_string(),
            value: config.log.format.clone(),
            valid: VALID_LOG_FORMATS.join(", "),
        }
        .into());
    }
    if config.run.teardown_timeout_secs == 0 {
        return Err(ConfigError::Zero {
            key: "run.teardown_timeout_secs".to_string(),
        }
        .into());
    }
    if semver::Version::parse(&config.qemu.min_version).is_err() {
        return Err(ConfigError::InvalidValue {
            key: "qemu.min_version".to_string(),
            value: config.qemu.min_version.clone(),
            valid: "a semantic version such as 4.2.0".to_string(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
