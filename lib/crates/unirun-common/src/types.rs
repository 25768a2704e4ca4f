use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::{Architecture, Platform};
use crate::quantity::Quantity;

/// One buildable (architecture, platform) combination of a project.
///
/// Targets come from the project provider and are never mutated by the
/// selector or the spec builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target name. Equals the project name when the project file gave none.
    pub name: String,
    pub architecture: String,
    pub platform: String,
    /// Path of the built kernel image on the local filesystem.
    pub kernel: PathBuf,
    /// Root filesystem inferred from the project, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs: Option<String>,
}

/// Lifecycle state of an instance as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    #[default]
    Pending,
    Running,
    Exited,
    Failed,
}

impl MachineState {
    /// `Exited` and `Failed` end an instance's life.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change delivered by the backend's watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEvent {
    pub state: MachineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MachineEvent {
    #[must_use]
    pub fn new(state: MachineState) -> Self {
        Self { state, error: None }
    }

    #[must_use]
    pub fn with_error(state: MachineState, error: impl Into<String>) -> Self {
        Self {
            state,
            error: Some(error.into()),
        }
    }
}

/// Resources requested for an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
}

/// Declarative description of what to run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Scheme-qualified kernel reference, `project://<project>:<target>`.
    pub kernel: String,
    pub architecture: Architecture,
    pub platform: Platform,
    /// Kernel command line. Empty unless explicitly overridden.
    #[serde(default)]
    pub kernel_args: Vec<String>,
    /// Application arguments, passed after the kernel arguments.
    #[serde(default)]
    pub app_args: Vec<String>,
    /// Root filesystem reference, e.g. `cpio+newc:///path/initramfs.cpio`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs: Option<String>,
    #[serde(default)]
    pub resources: Resources,
    pub emulation: bool,
}

/// Runtime status of an instance.
///
/// `platform_id` and `started_at` belong to the backend and are only read
/// by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub state: MachineState,
    pub kernel_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initrd_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Last error the backend attached to a state change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A unit of compute: identity, spec and status. One per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    /// Created lazily, the first time persistent local state is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    pub spec: InstanceSpec,
    pub status: InstanceStatus,
}

impl Instance {
    /// A fresh instance in the `Pending` state.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: InstanceSpec, status: InstanceStatus) -> Self {
        Self {
            name: name.into(),
            uid: None,
            spec,
            status: InstanceStatus {
                state: MachineState::Pending,
                ..status
            },
        }
    }

    /// Return the instance uid, generating one on first use.
    pub fn ensure_uid(&mut self) -> Uuid {
        *self.uid.get_or_insert_with(Uuid::new_v4)
    }
}
