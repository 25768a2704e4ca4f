//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared types crate;
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unirun_common::{Instance, MachineEvent, Target};

// ── Value Types ───────────────────────────────────────────────────────────────

/// A backend stream: items on one channel, errors on another.
///
/// The backend closes `items` when the stream ends.
pub struct Streams<T> {
    pub items: mpsc::Receiver<T>,
    pub errors: mpsc::Receiver<anyhow::Error>,
}

impl<T> Streams<T> {
    #[must_use]
    pub fn new(items: mpsc::Receiver<T>, errors: mpsc::Receiver<anyhow::Error>) -> Self {
        Self { items, errors }
    }
}

/// State changes of one instance, in delivery order.
pub type EventStreams = Streams<MachineEvent>;

/// Console output of one instance, one line per item.
pub type LogStreams = Streams<String>;

/// A project as seen by the run action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub workdir: PathBuf,
    pub targets: Vec<Target>,
}

/// An initrd archive ready to be attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initrd {
    pub path: PathBuf,
    /// Archive format tag, e.g. `newc`.
    pub format: String,
}

// ── Execution Backend Port ────────────────────────────────────────────────────

/// Platform-specific instance execution.
///
/// Every call takes the cancellation token of the caller. Calls that return
/// an [`Instance`] return the backend's view of it; fields the backend owns
/// (uid, `platform_id`, `started_at`) are read-only to callers.
#[allow(async_fn_in_trait)]
pub trait ExecutionBackend {
    /// Allocate an instance for `instance.spec`.
    async fn create(&self, cancel: &CancellationToken, instance: &Instance) -> Result<Instance>;
    /// Begin executing a created instance.
    async fn start(&self, cancel: &CancellationToken, instance: &Instance) -> Result<Instance>;
    /// Subscribe to state changes. Must be callable before `start`.
    async fn watch(&self, cancel: &CancellationToken, instance: &Instance) -> Result<EventStreams>;
    /// Open the console output stream of a started instance.
    async fn logs(&self, cancel: &CancellationToken, instance: &Instance) -> Result<LogStreams>;
    /// Stop a running instance.
    async fn stop(&self, cancel: &CancellationToken, instance: &Instance) -> Result<Instance>;
    /// Release every backend resource held by the instance.
    async fn delete(&self, cancel: &CancellationToken, instance: &Instance) -> Result<Instance>;
}

// ── Project Port ──────────────────────────────────────────────────────────────

/// Enumerates the targets of a project directory.
pub trait ProjectProvider {
    /// Load the project in `workdir`.
    ///
    /// `kraftfile` is either a path to a project file or its inline contents.
    fn load(&self, workdir: &Path, kraftfile: Option<&str>) -> Result<Project>;
}

// ── Initrd Port ───────────────────────────────────────────────────────────────

/// Turns an initrd descriptor into an archive.
pub trait InitrdPreparer {
    /// Prepare `descriptor` (a `host:guest` mapping, a directory or a file)
    /// relative to `workdir`, writing any generated archive into `output_dir`.
    fn prepare(&self, workdir: &Path, output_dir: &Path, descriptor: &str) -> Result<Initrd>;
}

// ── Target Choice Port ────────────────────────────────────────────────────────

/// Resolves ambiguous target selections.
pub trait TargetChooser {
    /// Whether `choose` may be called at all.
    fn is_interactive(&self) -> bool;
    /// Pick one of `targets`, returning its index.
    fn choose(&self, targets: &[Target]) -> Result<usize>;
}

// ── Local Filesystem Port ─────────────────────────────────────────────────────

/// Abstracts the few filesystem checks the run action performs.
pub trait LocalFs {
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
    /// Create `path` and all of its parents.
    fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;
}

// ── Output Ports ──────────────────────────────────────────────────────────────

/// Operator-visible instance output.
pub trait LogSink {
    /// Emit one line of instance output.
    fn line(&self, line: &str);
}

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
