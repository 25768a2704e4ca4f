//! Shared test helpers: call-recording fakes of the application ports.

#![allow(dead_code)]

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unirun::application::ports::{
    EventStreams, ExecutionBackend, Initrd, InitrdPreparer, LocalFs, LogSink, LogStreams,
    ProgressReporter, Project, ProjectProvider, Streams, TargetChooser,
};
use unirun_common::{
    Architecture, Instance, InstanceSpec, InstanceStatus, MachineEvent, MachineState, Platform,
    Resources, Target,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn target(name: &str, plat: &str, arch: &str) -> Target {
    Target {
        name: name.to_string(),
        architecture: arch.to_string(),
        platform: plat.to_string(),
        kernel: PathBuf::from(format!("/src/{name}/.unikraft/build/{name}_{plat}-{arch}")),
        rootfs: None,
    }
}

pub fn project(targets: Vec<Target>) -> Project {
    Project {
        name: "hello".to_string(),
        workdir: PathBuf::from("/src/hello"),
        targets,
    }
}

pub fn instance() -> Instance {
    let spec = InstanceSpec {
        kernel: "project://hello:qemu/x86_64".into(),
        architecture: Architecture::X86_64,
        platform: Platform::Qemu,
        kernel_args: Vec::new(),
        app_args: Vec::new(),
        rootfs: None,
        resources: Resources::default(),
        emulation: true,
    };
    let status = InstanceStatus {
        kernel_path: PathBuf::from("/src/hello/.unikraft/build/hello_qemu-x86_64"),
        ..InstanceStatus::default()
    };
    Instance::new("qemu/x86_64", spec, status)
}

pub fn running() -> MachineEvent {
    MachineEvent::new(MachineState::Running)
}

pub fn exited() -> MachineEvent {
    MachineEvent::new(MachineState::Exited)
}

// ── Backend script ───────────────────────────────────────────────────────────

/// What one stream of the fake backend delivers.
///
/// Items (and the optional error) are queued up front. When `close` is
/// false the senders are held so the stream stays open and blocks.
#[derive(Clone)]
pub struct StreamScript<T> {
    pub items: Vec<T>,
    pub error: Option<String>,
    pub close: bool,
}

impl<T> Default for StreamScript<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            error: None,
            close: false,
        }
    }
}

impl<T> StreamScript<T> {
    pub fn closed(items: Vec<T>) -> Self {
        Self {
            items,
            error: None,
            close: true,
        }
    }

    pub fn open(items: Vec<T>) -> Self {
        Self {
            items,
            error: None,
            close: false,
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error.to_string()),
            close: false,
        }
    }
}

// ── Fake backend ─────────────────────────────────────────────────────────────

/// Records every call by name; streams follow the configured scripts.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<&'static str>>,
    pub created: Mutex<Option<Instance>>,
    pub fail_create: bool,
    pub fail_watch: bool,
    pub fail_start: bool,
    pub fail_logs: bool,
    pub fail_stop: bool,
    /// Stop blocks for this long, ignoring its token.
    pub stop_delay: Option<Duration>,
    /// Name of a call (`watch`, `start` or `logs`) that never returns and
    /// ignores its token.
    pub hang: Option<&'static str>,
    pub events: StreamScript<MachineEvent>,
    pub logs: StreamScript<String>,
    /// Senders kept alive for streams that stay open.
    pub held: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl FakeBackend {
    /// Runs, prints `lines`, then exits cleanly.
    pub fn exiting_with(lines: &[&str]) -> Self {
        Self {
            events: StreamScript::closed(vec![running(), exited()]),
            logs: StreamScript::closed(lines.iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }

    /// Both streams stay open and silent.
    pub fn blocking() -> Self {
        Self {
            events: StreamScript::open(Vec::new()),
            logs: StreamScript::open(Vec::new()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == name).count()
    }

    /// Names of state-mutating calls only.
    pub fn mutations(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(*c, "create" | "start" | "stop" | "delete"))
            .collect()
    }

    async fn record(&self, name: &'static str) {
        lock(&self.calls).push(name);
        if self.hang == Some(name) {
            std::future::pending::<()>().await;
        }
    }

    fn streams<T: Clone + Send + 'static>(&self, script: &StreamScript<T>) -> Streams<T> {
        let (tx, rx) = mpsc::channel(script.items.len().max(1));
        for item in &script.items {
            let _ = tx.try_send(item.clone());
        }
        let (err_tx, err_rx) = mpsc::channel(1);
        if let Some(message) = &script.error {
            let _ = err_tx.try_send(anyhow::anyhow!("{message}"));
        }
        if !script.close {
            let mut held = lock(&self.held);
            held.push(Box::new(tx));
            held.push(Box::new(err_tx));
        }
        Streams::new(rx, err_rx)
    }
}

impl ExecutionBackend for FakeBackend {
    async fn create(&self, _: &CancellationToken, instance: &Instance) -> Result<Instance> {
        self.record("create").await;
        if self.fail_create {
            anyhow::bail!("create refused");
        }
        let mut created = instance.clone();
        created.ensure_uid();
        *lock(&self.created) = Some(created.clone());
        Ok(created)
    }

    async fn start(&self, _: &CancellationToken, instance: &Instance) -> Result<Instance> {
        self.record("start").await;
        if self.fail_start {
            anyhow::bail!("start refused");
        }
        let mut started = instance.clone();
        started.status.state = MachineState::Running;
        started.status.platform_id = Some("4242".into());
        Ok(started)
    }

    async fn watch(&self, _: &CancellationToken, _: &Instance) -> Result<EventStreams> {
        self.record("watch").await;
        if self.fail_watch {
            anyhow::bail!("watch refused");
        }
        Ok(self.streams(&self.events))
    }

    async fn logs(&self, _: &CancellationToken, _: &Instance) -> Result<LogStreams> {
        self.record("logs").await;
        if self.fail_logs {
            anyhow::bail!("logs refused");
        }
        Ok(self.streams(&self.logs))
    }

    async fn stop(&self, _: &CancellationToken, instance: &Instance) -> Result<Instance> {
        self.record("stop").await;
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stop {
            anyhow::bail!("stop refused");
        }
        Ok(instance.clone())
    }

    async fn delete(&self, _: &CancellationToken, instance: &Instance) -> Result<Instance> {
        self.record("delete").await;
        Ok(instance.clone())
    }
}

// ── Output fakes ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl LogSink for RecordingSink {
    fn line(&self, line: &str) {
        lock(&self.lines).push(line.to_string());
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub warnings: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        lock(&self.warnings).clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warn(&self, message: &str) {
        lock(&self.warnings).push(message.to_string());
    }
}

// ── Project / chooser / fs / initrd fakes ────────────────────────────────────

pub struct StaticProject {
    pub project: Option<Project>,
    pub loads: Mutex<u32>,
}

impl StaticProject {
    pub fn new(project: Project) -> Self {
        Self {
            project: Some(project),
            loads: Mutex::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            project: None,
            loads: Mutex::new(0),
        }
    }

    pub fn loads(&self) -> u32 {
        *lock(&self.loads)
    }
}

impl ProjectProvider for StaticProject {
    fn load(&self, workdir: &Path, _: Option<&str>) -> Result<Project> {
        *lock(&self.loads) += 1;
        self.project
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} is not a project", workdir.display()))
    }
}

pub struct FixedChooser {
    pub interactive: bool,
    pub index: usize,
    pub calls: Mutex<u32>,
}

impl FixedChooser {
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            index: 0,
            calls: Mutex::new(0),
        }
    }

    pub fn picking(index: usize) -> Self {
        Self {
            interactive: true,
            index,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *lock(&self.calls)
    }
}

impl TargetChooser for FixedChooser {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn choose(&self, _: &[Target]) -> Result<usize> {
        *lock(&self.calls) += 1;
        Ok(self.index)
    }
}

pub struct FakeFs {
    pub kernels_exist: bool,
    pub created_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeFs {
    pub fn with_kernels(kernels_exist: bool) -> Self {
        Self {
            kernels_exist,
            created_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        lock(&self.created_dirs).clone()
    }
}

impl LocalFs for FakeFs {
    fn exists(&self, _: &Path) -> bool {
        self.kernels_exist
    }

    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        lock(&self.created_dirs).push(path.to_path_buf());
        Ok(())
    }
}

/// Pretends to archive into `<output_dir>/initramfs.cpio`.
#[derive(Default)]
pub struct FakeInitrd {
    pub requests: Mutex<Vec<(PathBuf, String)>>,
}

impl InitrdPreparer for FakeInitrd {
    fn prepare(&self, _: &Path, output_dir: &Path, descriptor: &str) -> Result<Initrd> {
        lock(&self.requests).push((output_dir.to_path_buf(), descriptor.to_string()));
        Ok(Initrd {
            path: output_dir.join("initramfs.cpio"),
            format: "newc".to_string(),
        })
    }
}
