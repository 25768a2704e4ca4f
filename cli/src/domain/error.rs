//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! Ports and adapters speak `anyhow`; these enums are what a run reports.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use unirun_common::{QuantityError, UnknownName};

// ── Selection errors ──────────────────────────────────────────────────────────

/// Errors raised while narrowing project targets to exactly one.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error(
        "could not detect any project targets based on plat=\"{plat}\" arch=\"{arch}\" target=\"{name}\""
    )]
    NoTarget {
        arch: String,
        plat: String,
        name: String,
    },

    #[error(
        "could not determine what to run: {count} targets match. Narrow the choice with --arch, --plat or --target"
    )]
    Ambiguous { count: usize },

    #[error("could not select target: {0}")]
    Prompt(String),

    #[error("target selection returned index {index} but only {count} targets are available")]
    InvalidChoice { index: usize, count: usize },

    #[error("--target and --plat/--arch are mutually exclusive")]
    MutuallyExclusive,
}

// ── Spec build errors ─────────────────────────────────────────────────────────

/// Errors raised while turning a target into an instance spec.
#[derive(Debug, Error)]
pub enum SpecBuildError {
    #[error("invalid memory quantity '{value}': {cause}")]
    InvalidResource {
        value: String,
        #[source]
        cause: QuantityError,
    },

    #[error(
        "cannot run the selected project target '{target}' without building the kernel: build it first (missing {})",
        .path.display()
    )]
    KernelNotBuilt { target: String, path: PathBuf },

    #[error("target '{target}' has an unsupported architecture")]
    UnsupportedArchitecture {
        target: String,
        #[source]
        cause: UnknownName,
    },

    #[error("target '{target}' has an unsupported platform")]
    UnsupportedPlatform {
        target: String,
        #[source]
        cause: UnknownName,
    },

    #[error("could not make instance state dir {}", .path.display())]
    StateDir {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("could not prepare initramfs: {0:#}")]
    Initrd(anyhow::Error),
}

// ── Run errors ────────────────────────────────────────────────────────────────

/// Backend operations that mutate instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    Create,
    Start,
    Stop,
    Delete,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Delete => "delete",
        })
    }
}

/// The two backend streams a run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Events,
    Logs,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Events => "event",
            Self::Logs => "log",
        })
    }
}

/// The single terminal outcome of a failed run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not load project: {0:#}")]
    Project(anyhow::Error),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    SpecBuild(#[from] SpecBuildError),

    #[error("could not {op} instance: {cause:#}")]
    Backend { op: BackendOp, cause: anyhow::Error },

    #[error("{stream} stream error: {message}")]
    Stream { stream: StreamKind, message: String },

    #[error("run was cancelled")]
    Cancelled,

    #[error(
        "instance '{name}' failed when running{}",
        .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
    )]
    InstanceFailed {
        name: String,
        reason: Option<String>,
    },
}

impl RunError {
    /// Build a backend error for `op`.
    #[must_use]
    pub fn backend(op: BackendOp, cause: anyhow::Error) -> Self {
        Self::Backend { op, cause }
    }

    /// Build a stream error.
    #[must_use]
    pub fn stream(stream: StreamKind, message: impl Into<String>) -> Self {
        Self::Stream {
            stream,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable identifier used in JSON error objects.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Selection(_) => "selection",
            Self::SpecBuild(_) => "spec",
            Self::Backend { .. } => "backend",
            Self::Stream { .. } => "stream",
            Self::Cancelled => "cancelled",
            Self::InstanceFailed { .. } => "instance_failed",
        }
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 130,
            Self::Selection(_) | Self::SpecBuild(_) | Self::Project(_) => 2,
            _ => 1,
        }
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },

    #[error("{key} must be greater than zero")]
    Zero { key: String },
}
