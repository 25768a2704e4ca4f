//! Command implementations

pub mod run;
pub mod targets;
pub mod version;

use std::path::PathBuf;

use clap::Args;

use crate::domain::target::TargetFilters;

/// Where the project lives.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long, env = "INPUT_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Path to a Kraftfile, or its inline YAML contents
    #[arg(long, env = "INPUT_KRAFTFILE")]
    pub kraftfile: Option<String>,
}

/// Target filters shared by `run` and `targets`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Architecture of the target to run
    #[arg(long, env = "INPUT_ARCH")]
    pub arch: Option<String>,

    /// Platform of the target to run
    #[arg(long, env = "INPUT_PLAT")]
    pub plat: Option<String>,

    /// Name of the target to run (conflicts with --arch/--plat)
    #[arg(long, env = "INPUT_TARGET")]
    pub target: Option<String>,
}

impl FilterArgs {
    #[must_use]
    pub fn filters(&self) -> TargetFilters {
        TargetFilters {
            architecture: self.arch.clone().unwrap_or_default(),
            platform: self.plat.clone().unwrap_or_default(),
            name: self.target.clone().unwrap_or_default(),
        }
    }
}

/// Automation runners pass unset inputs as empty strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}
