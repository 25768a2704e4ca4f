//! Application service: the run use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Resolves a project target into an instance and hands it to the
//! lifecycle orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use unirun_common::Instance;

use crate::application::ports::{
    ExecutionBackend, InitrdPreparer, LocalFs, LogSink, ProgressReporter, ProjectProvider,
    TargetChooser,
};
use crate::application::services::lifecycle::Orchestrator;
use crate::domain::error::{RunError, SpecBuildError};
use crate::domain::spec::{self, SpecOverrides};
use crate::domain::target::{self, TargetFilters};

/// Adapters the run use-case is composed of.
pub struct ExecuteDeps<'a, P, C, I, F, B, S, R> {
    pub project: &'a P,
    pub chooser: &'a C,
    pub initrd: &'a I,
    pub fs: &'a F,
    pub backend: &'a B,
    pub sink: &'a S,
    pub reporter: &'a R,
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub workdir: PathBuf,
    /// Project file path or inline contents.
    pub kraftfile: Option<String>,
    pub filters: TargetFilters,
    pub overrides: SpecOverrides,
    /// Initrd descriptor, see [`InitrdPreparer::prepare`].
    pub initrd: Option<String>,
    /// Parent of per-instance state directories.
    pub runtime_dir: PathBuf,
    /// Never prompt, even when the chooser could.
    pub no_prompt: bool,
    pub teardown_timeout: Duration,
}

/// Run one project target to completion.
///
/// Selection and spec errors are returned before the backend is touched.
///
/// # Errors
///
/// Returns the single [`RunError`] describing why the run did not end with
/// the instance exiting cleanly.
pub async fn execute<P, C, I, F, B, S, R>(
    cancel: &CancellationToken,
    deps: &ExecuteDeps<'_, P, C, I, F, B, S, R>,
    opts: ExecuteOptions,
) -> Result<Instance, RunError>
where
    P: ProjectProvider,
    C: TargetChooser,
    I: InitrdPreparer,
    F: LocalFs,
    B: ExecutionBackend,
    S: LogSink,
    R: ProgressReporter,
{
    opts.filters.validate()?;

    let project = deps
        .project
        .load(&opts.workdir, opts.kraftfile.as_deref())
        .map_err(RunError::Project)?;
    tracing::debug!(
        project = %project.name,
        workdir = %project.workdir.display(),
        targets = project.targets.len(),
        "loaded project"
    );

    let interactive = deps.chooser.is_interactive() && !opts.no_prompt;
    let selected = target::select(&project.targets, &opts.filters, interactive, |targets| {
        deps.chooser.choose(targets).map_err(|e| format!("{e:#}"))
    })?;
    tracing::info!(
        target = %spec::resolve_target_name(&project.name, &selected),
        kernel = %selected.kernel.display(),
        "selected target"
    );

    let mut instance = spec::build(&project.name, &selected, &opts.overrides, |path| {
        deps.fs.exists(path)
    })?;

    if let Some(descriptor) = opts.initrd.as_deref() {
        attach_initrd(deps, &opts, &project.workdir, descriptor, &mut instance)?;
    }

    let orchestrator =
        Orchestrator::new(deps.backend, deps.sink, deps.reporter, opts.teardown_timeout);
    orchestrator.run(cancel, instance).await
}

fn attach_initrd<P, C, I, F, B, S, R>(
    deps: &ExecuteDeps<'_, P, C, I, F, B, S, R>,
    opts: &ExecuteOptions,
    workdir: &std::path::Path,
    descriptor: &str,
    instance: &mut Instance,
) -> Result<(), SpecBuildError>
where
    I: InitrdPreparer,
    F: LocalFs,
    R: ProgressReporter,
{
    let uid = instance.ensure_uid();
    let state_dir = opts.runtime_dir.join(uid.to_string());
    deps.fs
        .create_dir_all(&state_dir)
        .map_err(|cause| SpecBuildError::StateDir {
            path: state_dir.clone(),
            cause,
        })?;
    instance.status.state_dir = Some(state_dir.clone());

    deps.reporter.step("preparing initramfs...");
    let initrd = deps
        .initrd
        .prepare(workdir, &state_dir, descriptor)
        .map_err(SpecBuildError::Initrd)?;
    tracing::debug!(path = %initrd.path.display(), format = %initrd.format, "prepared initramfs");

    spec::apply_initrd(instance, &initrd.format, &initrd.path);
    Ok(())
}
