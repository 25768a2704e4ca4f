//! Instance spec construction from a selected target.
//!
//! Pure functions only. The kernel artifact check is injected so the domain
//! never touches the filesystem.

use std::path::Path;

use unirun_common::{
    Architecture, Instance, InstanceSpec, InstanceStatus, Platform, Quantity, Resources, Target,
};

use crate::domain::error::SpecBuildError;

/// User-supplied overrides applied on top of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOverrides {
    /// Kernel command line. Replaces the default (empty) arguments when non-empty.
    pub kernel_args: Vec<String>,
    /// Application arguments.
    pub app_args: Vec<String>,
    /// Human-readable memory quantity, e.g. `128Mi`.
    pub memory: Option<String>,
    /// Instance name. Defaults to the resolved target name.
    pub name: Option<String>,
    pub emulation: bool,
}

impl Default for SpecOverrides {
    fn default() -> Self {
        Self {
            kernel_args: Vec::new(),
            app_args: Vec::new(),
            memory: None,
            name: None,
            emulation: true,
        }
    }
}

/// Human-distinguishing name for `target`.
///
/// A target named after its project (or not named at all) is displayed as
/// `<platform>/<architecture>`.
#[must_use]
pub fn resolve_target_name(project_name: &str, target: &Target) -> String {
    if target.name.is_empty() || target.name == project_name {
        format!("{}/{}", target.platform, target.architecture)
    } else {
        target.name.clone()
    }
}

/// `project://<project>:<target>`
#[must_use]
pub fn kernel_reference(project_name: &str, target_name: &str) -> String {
    format!("project://{project_name}:{target_name}")
}

/// `cpio+<format>://<path>`
#[must_use]
pub fn initrd_rootfs(format: &str, path: &Path) -> String {
    format!("cpio+{format}://{}", path.display())
}

/// Parse a memory override.
///
/// # Errors
///
/// Returns [`SpecBuildError::InvalidResource`] when `value` is not a valid
/// quantity with a unit.
pub fn parse_memory(value: &str) -> Result<Quantity, SpecBuildError> {
    Quantity::parse(value).map_err(|cause| SpecBuildError::InvalidResource {
        value: value.to_string(),
        cause,
    })
}

/// Build a `Pending` instance for `target`.
///
/// `kernel_exists` reports whether the target's kernel artifact is present;
/// a missing artifact fails the build so the backend never sees it.
///
/// # Errors
///
/// Returns a [`SpecBuildError`] for an invalid memory quantity, an
/// unsupported architecture or platform, or a missing kernel.
pub fn build(
    project_name: &str,
    target: &Target,
    overrides: &SpecOverrides,
    kernel_exists: impl Fn(&Path) -> bool,
) -> Result<Instance, SpecBuildError> {
    let target_name = resolve_target_name(project_name, target);

    let memory = overrides.memory.as_deref().map(parse_memory).transpose()?;

    let architecture: Architecture = target.architecture.parse().map_err(|cause| {
        SpecBuildError::UnsupportedArchitecture {
            target: target_name.clone(),
            cause,
        }
    })?;
    let platform: Platform =
        target
            .platform
            .parse()
            .map_err(|cause| SpecBuildError::UnsupportedPlatform {
                target: target_name.clone(),
                cause,
            })?;

    if !kernel_exists(&target.kernel) {
        return Err(SpecBuildError::KernelNotBuilt {
            target: target_name,
            path: target.kernel.clone(),
        });
    }

    let spec = InstanceSpec {
        kernel: kernel_reference(project_name, &target_name),
        architecture,
        platform,
        kernel_args: overrides.kernel_args.clone(),
        app_args: overrides.app_args.clone(),
        rootfs: target.rootfs.clone(),
        resources: Resources { memory },
        emulation: overrides.emulation,
    };
    let status = InstanceStatus {
        kernel_path: target.kernel.clone(),
        ..InstanceStatus::default()
    };

    let name = overrides
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or(target_name);

    Ok(Instance::new(name, spec, status))
}

/// Point `instance` at a prepared initrd archive.
///
/// The initrd replaces any root filesystem inferred from the target.
pub fn apply_initrd(instance: &mut Instance, format: &str, path: &Path) {
    instance.spec.rootfs = Some(initrd_rootfs(format, path));
    instance.status.initrd_path = Some(path.to_path_buf());
}
