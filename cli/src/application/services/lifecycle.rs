//! Instance lifecycle orchestration: create, start, observe, clean up.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//!
//! One [`Orchestrator`] drives exactly one instance. The control flow owns
//! every state-mutating backend call and every write to the instance
//! status; a single spawned watcher task forwards state changes over a
//! one-way channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use unirun_common::{Instance, MachineEvent, MachineState};

use crate::application::ports::{
    EventStreams, ExecutionBackend, LogSink, LogStreams, ProgressReporter,
};
use crate::domain::error::{BackendOp, RunError, StreamKind};

const EVENTS_CLOSED: &str = "event stream closed before the instance reached a terminal state";

/// Messages from the watcher task to the control flow.
#[derive(Debug)]
enum WatchMsg {
    State(MachineEvent),
    Error(String),
    Closed,
}

/// Drives one instance through its lifecycle.
pub struct Orchestrator<'a, B, S, R> {
    backend: &'a B,
    sink: &'a S,
    reporter: &'a R,
    teardown: Teardown,
}

impl<'a, B, S, R> Orchestrator<'a, B, S, R>
where
    B: ExecutionBackend,
    S: LogSink,
    R: ProgressReporter,
{
    #[must_use]
    pub fn new(backend: &'a B, sink: &'a S, reporter: &'a R, teardown_timeout: Duration) -> Self {
        Self {
            backend,
            sink,
            reporter,
            teardown: Teardown::new(teardown_timeout),
        }
    }

    /// Run `instance` to completion.
    ///
    /// Returns the final instance when it exited cleanly.
    ///
    /// # Errors
    ///
    /// - [`RunError::Backend`] when Create fails (nothing to clean up) or
    ///   when Start fails (after Stop and Delete were attempted).
    /// - [`RunError::Stream`] when the event or log stream fails first.
    /// - [`RunError::Cancelled`] when `cancel` fires before a terminal state.
    /// - [`RunError::InstanceFailed`] when the backend reports `Failed`; the
    ///   instance is left in place for inspection.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        instance: Instance,
    ) -> Result<Instance, RunError> {
        tracing::debug!(instance = %instance.name, kernel = %instance.spec.kernel, "creating instance");
        self.reporter.step(&format!("creating instance {}...", instance.name));

        let mut instance = self
            .backend
            .create(cancel, &instance)
            .await
            .map_err(|e| RunError::backend(BackendOp::Create, e))?;
        tracing::info!(instance = %instance.name, uid = ?instance.uid, "instance created");

        // Everything past this point may hold backend resources.
        let run_cancel = cancel.child_token();

        let watched = until_cancelled(&run_cancel, self.backend.watch(&run_cancel, &instance)).await;
        let events = match watched {
            None => return self.finish(instance, Some(RunError::Cancelled)).await,
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                tracing::error!(instance = %instance.name, "could not listen for instance updates: {e:#}");
                let primary = RunError::stream(StreamKind::Events, format!("{e:#}"));
                return self.finish(instance, Some(primary)).await;
            }
        };

        let (watch_tx, mut watch_rx) = mpsc::unbounded_channel();
        let watcher = spawn_watcher(events, run_cancel.clone(), watch_tx);

        let started = until_cancelled(&run_cancel, self.backend.start(&run_cancel, &instance)).await;
        let primary = match started {
            None => {
                tracing::debug!(instance = %instance.name, "run cancelled while starting");
                Some(RunError::Cancelled)
            }
            Some(Ok(started)) => {
                instance = started;
                self.reporter.success(&format!("instance {} started", instance.name));
                tracing::info!(instance = %instance.name, "instance started");
                self.observe(&run_cancel, &mut instance, &mut watch_rx).await
            }
            Some(Err(e)) => {
                tracing::error!(instance = %instance.name, "could not start instance: {e:#}");
                run_cancel.cancel();
                Some(RunError::backend(BackendOp::Start, e))
            }
        };

        // Join point: stop the watcher and fold in whatever it left behind.
        run_cancel.cancel();
        if let Err(e) = watcher.await {
            tracing::warn!(instance = %instance.name, "watcher task ended abnormally: {e}");
        }
        while let Ok(msg) = watch_rx.try_recv() {
            match msg {
                WatchMsg::State(event) => apply_event(&mut instance, &event),
                WatchMsg::Error(message) => self.report_secondary(&instance, &message),
                WatchMsg::Closed => {}
            }
        }

        self.finish(instance, primary).await
    }

    /// Stream logs until the run is over, mirroring watcher updates into
    /// `instance.status`. Returns the first decisive error, if any.
    async fn observe(
        &self,
        cancel: &CancellationToken,
        instance: &mut Instance,
        watch_rx: &mut mpsc::UnboundedReceiver<WatchMsg>,
    ) -> Option<RunError> {
        let mut logs = match until_cancelled(cancel, self.backend.logs(cancel, instance)).await {
            None => return Some(RunError::Cancelled),
            Some(Ok(logs)) => logs,
            Some(Err(e)) => {
                tracing::error!(instance = %instance.name, "could not listen for instance logs: {e:#}");
                return Some(RunError::stream(StreamKind::Logs, format!("{e:#}")));
            }
        };

        let mut logs_open = true;
        let mut log_errors_open = true;
        let mut watcher_open = true;

        let primary = loop {
            if !logs_open && instance.status.state.is_terminal() {
                break None;
            }

            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!(instance = %instance.name, "run cancelled");
                    break Some(RunError::Cancelled);
                }
                line = logs.items.recv(), if logs_open => match line {
                    Some(line) => self.sink.line(&line),
                    None => {
                        tracing::debug!(instance = %instance.name, "log stream closed");
                        logs_open = false;
                    }
                },
                err = logs.errors.recv(), if log_errors_open => match err {
                    Some(e) => {
                        tracing::error!(instance = %instance.name, "received log error: {e:#}");
                        break Some(RunError::stream(StreamKind::Logs, format!("{e:#}")));
                    }
                    None => log_errors_open = false,
                },
                msg = watch_rx.recv(), if watcher_open => match msg {
                    Some(WatchMsg::State(event)) => apply_event(instance, &event),
                    Some(WatchMsg::Error(message)) => {
                        tracing::error!(instance = %instance.name, "received event error: {message}");
                        break Some(RunError::stream(StreamKind::Events, message));
                    }
                    Some(WatchMsg::Closed) => break Some(closed_or_cancelled(cancel)),
                    None => {
                        watcher_open = false;
                        if !instance.status.state.is_terminal() {
                            break Some(closed_or_cancelled(cancel));
                        }
                    }
                },
            }
        };

        if primary.is_some() {
            self.drain_log_errors(instance, &mut logs);
        }
        primary
    }

    /// Decide the run's outcome from the final observed state.
    async fn finish(
        &self,
        instance: Instance,
        primary: Option<RunError>,
    ) -> Result<Instance, RunError> {
        match instance.status.state {
            MachineState::Exited => {
                if let Some(err) = primary {
                    tracing::warn!(instance = %instance.name, "instance exited; ignoring: {err}");
                }
                tracing::info!(instance = %instance.name, "instance exited");
                Ok(instance)
            }
            MachineState::Failed => {
                if let Some(err) = primary {
                    tracing::warn!(instance = %instance.name, "instance failed; also saw: {err}");
                }
                Err(RunError::InstanceFailed {
                    name: instance.name.clone(),
                    reason: instance.status.error.clone(),
                })
            }
            MachineState::Pending | MachineState::Running => {
                self.cleanup(&instance).await;
                Err(primary.unwrap_or_else(|| RunError::stream(StreamKind::Events, EVENTS_CLOSED)))
            }
        }
    }

    /// Best-effort Stop then Delete. Runs at most once per orchestrator;
    /// returns whether this call performed the teardown.
    pub async fn cleanup(&self, instance: &Instance) -> bool {
        self.teardown.run(self.backend, self.reporter, instance).await
    }

    fn drain_log_errors(&self, instance: &Instance, logs: &mut LogStreams) {
        while let Ok(e) = logs.errors.try_recv() {
            self.report_secondary(instance, &format!("{e:#}"));
        }
    }

    fn report_secondary(&self, instance: &Instance, message: &str) {
        tracing::warn!(instance = %instance.name, "additional stream error: {message}");
        self.reporter.warn(&format!("additional error: {message}"));
    }
}

/// Await `call` unless `cancel` fires first; `None` means cancelled.
///
/// Backend calls that ignore their token must not keep a cancelled run
/// alive.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Option<anyhow::Result<T>> {
    tokio::select! {
        biased;

        () = cancel.cancelled() => None,
        result = call => Some(result),
    }
}

/// A watcher that went away early either saw the run cancelled or lost its
/// event stream.
fn closed_or_cancelled(cancel: &CancellationToken) -> RunError {
    if cancel.is_cancelled() {
        RunError::Cancelled
    } else {
        RunError::stream(StreamKind::Events, EVENTS_CLOSED)
    }
}

fn apply_event(instance: &mut Instance, event: &MachineEvent) {
    tracing::debug!(instance = %instance.name, state = %event.state, "instance state changed");
    instance.status.state = event.state;
    if let Some(error) = &event.error {
        tracing::warn!(instance = %instance.name, state = %event.state, "backend reported: {error}");
        instance.status.error = Some(error.clone());
    }
}

// ── Watcher ───────────────────────────────────────────────────────────────────

fn spawn_watcher(
    events: EventStreams,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<WatchMsg>,
) -> JoinHandle<()> {
    tokio::spawn(watch(events, cancel, tx))
}

/// Forward state changes until a terminal state, a stream error, stream
/// closure or cancellation.
async fn watch(
    mut events: EventStreams,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<WatchMsg>,
) {
    let mut errors_open = true;
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                forward_queued(&mut events, &tx);
                return;
            }
            event = events.items.recv() => match event {
                Some(event) => {
                    let terminal = event.state.is_terminal();
                    if tx.send(WatchMsg::State(event)).is_err() || terminal {
                        return;
                    }
                }
                None => {
                    let _ = tx.send(WatchMsg::Closed);
                    return;
                }
            },
            err = events.errors.recv(), if errors_open => match err {
                Some(e) => {
                    let _ = tx.send(WatchMsg::Error(format!("{e:#}")));
                    return;
                }
                None => errors_open = false,
            },
        }
    }
}

/// Hand over whatever the backend had already delivered, without waiting.
fn forward_queued(events: &mut EventStreams, tx: &mpsc::UnboundedSender<WatchMsg>) {
    while let Ok(event) = events.items.try_recv() {
        let terminal = event.state.is_terminal();
        if tx.send(WatchMsg::State(event)).is_err() || terminal {
            return;
        }
    }
    if let Ok(e) = events.errors.try_recv() {
        let _ = tx.send(WatchMsg::Error(format!("{e:#}")));
    }
}

// ── Teardown ──────────────────────────────────────────────────────────────────

/// Stop then Delete, at most once.
///
/// Each call gets a fresh cancellation token, since the run's own token is
/// usually already cancelled by the time teardown starts, and is bounded by
/// `timeout`.
pub struct Teardown {
    started: AtomicBool,
    timeout: Duration,
}

impl Teardown {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            started: AtomicBool::new(false),
            timeout,
        }
    }

    /// Returns `false` when a teardown already ran.
    pub async fn run(
        &self,
        backend: &impl ExecutionBackend,
        reporter: &impl ProgressReporter,
        instance: &Instance,
    ) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!(instance = %instance.name, "teardown already performed");
            return false;
        }

        reporter.step(&format!("removing instance {}...", instance.name));

        let cancel = CancellationToken::new();
        let stopped = tokio::time::timeout(self.timeout, backend.stop(&cancel, instance)).await;
        self.report(BackendOp::Stop, instance, reporter, &cancel, stopped.map(|r| r.map(drop)));

        let cancel = CancellationToken::new();
        let deleted = tokio::time::timeout(self.timeout, backend.delete(&cancel, instance)).await;
        self.report(BackendOp::Delete, instance, reporter, &cancel, deleted.map(|r| r.map(drop)));

        true
    }

    fn report(
        &self,
        op: BackendOp,
        instance: &Instance,
        reporter: &impl ProgressReporter,
        cancel: &CancellationToken,
        outcome: Result<anyhow::Result<()>, tokio::time::error::Elapsed>,
    ) {
        match outcome {
            Ok(Ok(())) => tracing::debug!(instance = %instance.name, %op, "teardown step done"),
            Ok(Err(e)) => {
                tracing::error!(instance = %instance.name, "could not {op} instance: {e:#}");
                reporter.warn(&format!("could not {op} instance {}: {e:#}", instance.name));
            }
            Err(_) => {
                cancel.cancel();
                tracing::error!(
                    instance = %instance.name,
                    timeout_secs = self.timeout.as_secs(),
                    "{op} timed out"
                );
                reporter.warn(&format!("{op} of instance {} timed out", instance.name));
            }
        }
    }
}
