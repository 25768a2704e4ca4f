//! Tests for the `execute` application service.
//!
//! Selection and spec failures must happen before the backend is touched;
//! a successful run goes through the orchestrator end to end.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use unirun::application::services::execute::{ExecuteDeps, ExecuteOptions, execute};
use unirun::domain::{RunError, SelectionError, SpecBuildError, SpecOverrides, TargetFilters};
use unirun_common::Instance;

use crate::helpers::{
    FakeBackend, FakeFs, FakeInitrd, FixedChooser, RecordingReporter, RecordingSink,
    StaticProject, project, target,
};

struct World {
    project: StaticProject,
    chooser: FixedChooser,
    initrd: FakeInitrd,
    fs: FakeFs,
    backend: FakeBackend,
    sink: RecordingSink,
    reporter: RecordingReporter,
}

impl World {
    fn new(project: StaticProject, backend: FakeBackend) -> Self {
        Self {
            project,
            chooser: FixedChooser::non_interactive(),
            initrd: FakeInitrd::default(),
            fs: FakeFs::with_kernels(true),
            backend,
            sink: RecordingSink::default(),
            reporter: RecordingReporter::default(),
        }
    }

    async fn execute(&self, opts: ExecuteOptions) -> Result<Instance, RunError> {
        let deps = ExecuteDeps {
            project: &self.project,
            chooser: &self.chooser,
            initrd: &self.initrd,
            fs: &self.fs,
            backend: &self.backend,
            sink: &self.sink,
            reporter: &self.reporter,
        };
        tokio::time::timeout(
            Duration::from_secs(10),
            execute(&CancellationToken::new(), &deps, opts),
        )
        .await
        .expect("execute must finish")
    }
}

fn options() -> ExecuteOptions {
    ExecuteOptions {
        workdir: PathBuf::from("/src/hello"),
        kraftfile: None,
        filters: TargetFilters::default(),
        overrides: SpecOverrides::default(),
        initrd: None,
        runtime_dir: PathBuf::from("/run/unirun"),
        no_prompt: false,
        teardown_timeout: Duration::from_secs(5),
    }
}

fn single_target() -> StaticProject {
    StaticProject::new(project(vec![target("hello", "qemu", "x86_64")]))
}

fn two_targets() -> StaticProject {
    StaticProject::new(project(vec![
        target("hello", "qemu", "x86_64"),
        target("hello", "qemu", "arm64"),
    ]))
}

#[tokio::test]
async fn end_to_end_with_memory_override() {
    let world = World::new(
        single_target(),
        FakeBackend::exiting_with(&["Hello from Unikraft!", "bye"]),
    );
    let mut opts = options();
    opts.overrides.memory = Some("128MiB".into());

    let instance = world.execute(opts).await.expect("run succeeds");

    assert_eq!(world.sink.lines(), vec!["Hello from Unikraft!", "bye"]);
    assert_eq!(instance.name, "qemu/x86_64");
    let created = world.backend.created.lock().unwrap().clone().expect("created");
    assert_eq!(
        created.spec.resources.memory.as_ref().map(|m| m.mebibytes()),
        Some(128)
    );
    assert_eq!(created.spec.kernel, "project://hello:qemu/x86_64");
    assert!(created.spec.emulation);
    assert_eq!(world.backend.count("stop"), 0);
}

#[tokio::test]
async fn memory_without_unit_fails_before_create() {
    let world = World::new(single_target(), FakeBackend::exiting_with(&[]));
    let mut opts = options();
    opts.overrides.memory = Some("100".into());

    let err = world.execute(opts).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::SpecBuild(SpecBuildError::InvalidResource { .. })
    ));
    assert!(world.backend.calls().is_empty());
}

#[tokio::test]
async fn missing_kernel_makes_no_backend_calls() {
    let mut world = World::new(single_target(), FakeBackend::exiting_with(&[]));
    world.fs = FakeFs::with_kernels(false);

    let err = world.execute(options()).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::SpecBuild(SpecBuildError::KernelNotBuilt { .. })
    ));
    assert!(err.to_string().contains("build"));
    assert!(world.backend.calls().is_empty());
}

#[tokio::test]
async fn ambiguous_targets_without_prompt() {
    let world = World::new(two_targets(), FakeBackend::exiting_with(&[]));

    let err = world.execute(options()).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Selection(SelectionError::Ambiguous { count: 2 })
    ));
    assert_eq!(err.exit_code(), 2);
    assert!(world.backend.calls().is_empty());
}

#[tokio::test]
async fn interactive_chooser_resolves_ambiguity() {
    let mut world = World::new(two_targets(), FakeBackend::exiting_with(&[]));
    world.chooser = FixedChooser::picking(1);

    let instance = world.execute(options()).await.expect("run succeeds");

    assert_eq!(world.chooser.calls(), 1);
    assert_eq!(instance.name, "qemu/arm64");
}

#[tokio::test]
async fn no_prompt_overrides_an_interactive_chooser() {
    let mut world = World::new(two_targets(), FakeBackend::exiting_with(&[]));
    world.chooser = FixedChooser::picking(1);
    let mut opts = options();
    opts.no_prompt = true;

    let err = world.execute(opts).await.unwrap_err();

    assert!(matches!(err, RunError::Selection(SelectionError::Ambiguous { .. })));
    assert_eq!(world.chooser.calls(), 0);
}

#[tokio::test]
async fn filters_narrow_to_one_target() {
    let world = World::new(two_targets(), FakeBackend::exiting_with(&[]));
    let mut opts = options();
    opts.filters.architecture = "arm64".into();

    let instance = world.execute(opts).await.expect("run succeeds");
    assert_eq!(instance.spec.architecture.as_str(), "arm64");
}

#[tokio::test]
async fn target_with_platform_is_rejected_before_loading() {
    let world = World::new(single_target(), FakeBackend::exiting_with(&[]));
    let mut opts = options();
    opts.filters.platform = "qemu".into();
    opts.filters.name = "hello".into();

    let err = world.execute(opts).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Selection(SelectionError::MutuallyExclusive)
    ));
    assert_eq!(world.project.loads(), 0);
}

#[tokio::test]
async fn unloadable_project() {
    let world = World::new(StaticProject::missing(), FakeBackend::exiting_with(&[]));

    let err = world.execute(options()).await.unwrap_err();

    assert!(matches!(err, RunError::Project(_)));
    assert!(err.to_string().contains("is not a project"));
}

#[tokio::test]
async fn initrd_is_prepared_in_the_instance_state_dir() {
    let world = World::new(single_target(), FakeBackend::exiting_with(&[]));
    let mut opts = options();
    opts.initrd = Some("./rootfs:/".into());

    let instance = world.execute(opts).await.expect("run succeeds");

    let uid = instance.uid.expect("uid assigned for state dir");
    let state_dir = PathBuf::from("/run/unirun").join(uid.to_string());
    assert_eq!(world.fs.created_dirs(), vec![state_dir.clone()]);
    assert_eq!(instance.status.state_dir.as_ref(), Some(&state_dir));

    let archive = state_dir.join("initramfs.cpio");
    assert_eq!(
        instance.spec.rootfs,
        Some(format!("cpio+newc://{}", archive.display()))
    );
    assert_eq!(instance.status.initrd_path, Some(archive));
}

#[tokio::test]
async fn kernel_args_and_app_args_reach_the_backend() {
    let world = World::new(single_target(), FakeBackend::exiting_with(&[]));
    let mut opts = options();
    opts.overrides.kernel_args = vec!["vfs.fstab=[]".into()];
    opts.overrides.app_args = vec!["-p".into(), "8080".into()];
    opts.overrides.name = Some("web".into());

    world.execute(opts).await.expect("run succeeds");

    let created = world.backend.created.lock().unwrap().clone().expect("created");
    assert_eq!(created.name, "web");
    assert_eq!(created.spec.kernel_args, vec!["vfs.fstab=[]"]);
    assert_eq!(created.spec.app_args, vec!["-p", "8080"]);
}
