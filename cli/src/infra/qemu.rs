//! QEMU execution backend: implements `ExecutionBackend`.
//!
//! Each instance is one `qemu-system-<arch>` child process. A waiter task
//! owns the child and publishes its exit; stdout feeds the log stream.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use unirun_common::{Architecture, Instance, MachineEvent, MachineState, Platform};
use uuid::Uuid;

use crate::application::ports::{EventStreams, ExecutionBackend, LogStreams, Streams};
use crate::domain::config::QemuConfig;

const EVENT_BUFFER: usize = 16;
const LOG_BUFFER: usize = 256;

struct Entry {
    instance: Instance,
    subscribers: Vec<mpsc::Sender<MachineEvent>>,
    logs: Option<LogStreams>,
    kill: CancellationToken,
    waiter: Option<JoinHandle<()>>,
}

type Registry = Arc<Mutex<HashMap<Uuid, Entry>>>;

/// Runs instances as local QEMU processes.
pub struct QemuBackend {
    config: QemuConfig,
    instances: Registry,
}

impl QemuBackend {
    #[must_use]
    pub fn new(config: QemuConfig) -> Self {
        Self {
            config,
            instances: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Emulator binary for `arch`.
    #[must_use]
    pub fn binary(&self, arch: Architecture) -> String {
        let suffix = match arch {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "aarch64",
            Architecture::Arm => "arm",
        };
        format!("{}{suffix}", self.config.binary_prefix)
    }

    async fn check_version(&self, cancel: &CancellationToken, binary: &str) -> Result<()> {
        let min = semver::Version::parse(&self.config.min_version)
            .with_context(|| format!("invalid minimum QEMU version {}", self.config.min_version))?;

        let output = tokio::select! {
            out = tokio::process::Command::new(binary)
                .arg("--version")
                .kill_on_drop(true)
                .output() => out.with_context(|| format!("failed to run {binary} --version"))?,
            () = cancel.cancelled() => anyhow::bail!("cancelled while probing {binary}"),
        };
        if !output.status.success() {
            anyhow::bail!("{binary} --version exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_qemu_version(&stdout)
            .ok_or_else(|| anyhow::anyhow!("cannot parse {binary} version from '{}'", stdout.trim()))?;
        if version < min {
            anyhow::bail!("{binary} {version} is too old, {min} or newer is required");
        }
        tracing::debug!(%binary, %version, "qemu version ok");
        Ok(())
    }

    fn with_entry<T>(&self, instance: &Instance, f: impl FnOnce(&mut Entry) -> T) -> Result<T> {
        let uid = instance
            .uid
            .ok_or_else(|| anyhow::anyhow!("instance {} was never created", instance.name))?;
        let mut map = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map
            .get_mut(&uid)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {} ({uid})", instance.name))?;
        Ok(f(entry))
    }
}

impl ExecutionBackend for QemuBackend {
    async fn create(&self, cancel: &CancellationToken, instance: &Instance) -> Result<Instance> {
        if instance.spec.platform != Platform::Qemu {
            anyhow::bail!(
                "platform {} is not supported by the qemu backend",
                instance.spec.platform
            );
        }
        let binary = self.binary(instance.spec.architecture);
        self.check_version(cancel, &binary).await?;

        let kernel = &instance.status.kernel_path;
        if !kernel.is_file() {
            anyhow::bail!("kernel {} does not exist", kernel.display());
        }

        let mut created = instance.clone();
        let uid = created.ensure_uid();
        created.status.state = MachineState::Pending;

        let mut map = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(
            uid,
            Entry {
                instance: created.clone(),
                subscribers: Vec::new(),
                logs: None,
                kill: CancellationToken::new(),
                waiter: None,
            },
        );
        Ok(created)
    }

    async fn start(&self, _cancel: &CancellationToken, instance: &Instance) -> Result<Instance> {
        let binary = self.binary(instance.spec.architecture);
        let args = qemu_args(instance, &self.config);
        tracing::debug!(%binary, args = ?args, "spawning qemu");

        let mut child = tokio::process::Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {binary}"))?;

        let (line_tx, line_rx) = mpsc::channel(LOG_BUFFER);
        let (log_err_tx, log_err_rx) = mpsc::channel(1);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if line_tx.send(line).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(e) => {
                            let _ = log_err_tx.send(anyhow::Error::new(e)).await;
                            return;
                        }
                    }
                }
            });
        }
        let stderr_tail = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut last = None;
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "qemu", "{line}");
                    if !line.trim().is_empty() {
                        last = Some(line);
                    }
                }
                last
            })
        });

        let pid = child.id();
        let (started, kill, subscribers) = self.with_entry(instance, |entry| {
            entry.instance.status.state = MachineState::Running;
            entry.instance.status.platform_id = pid.map(|p| p.to_string());
            entry.instance.status.started_at = Some(Utc::now());
            entry.logs = Some(Streams::new(line_rx, log_err_rx));
            (
                entry.instance.clone(),
                entry.kill.clone(),
                entry.subscribers.clone(),
            )
        })?;
        broadcast(&subscribers, MachineEvent::new(MachineState::Running)).await;

        let registry = Arc::clone(&self.instances);
        let uid = started.uid;
        let waiter = tokio::spawn(async move {
            let event = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => MachineEvent::new(MachineState::Exited),
                    Ok(status) => {
                        let tail = match stderr_tail {
                            Some(task) => task.await.ok().flatten(),
                            None => None,
                        };
                        let reason = match tail {
                            Some(tail) => format!("{status}: {tail}"),
                            None => status.to_string(),
                        };
                        MachineEvent::with_error(MachineState::Failed, reason)
                    }
                    Err(e) => MachineEvent::with_error(MachineState::Failed, e.to_string()),
                },
                () = kill.cancelled() => {
                    let _ = child.kill().await;
                    MachineEvent::new(MachineState::Exited)
                }
            };
            if let Some(uid) = uid {
                publish(&registry, uid, event).await;
            }
        });
        self.with_entry(instance, |entry| entry.waiter = Some(waiter))?;

        tracing::info!(instance = %started.name, pid = ?pid, "qemu started");
        Ok(started)
    }

    async fn watch(&self, _cancel: &CancellationToken, instance: &Instance) -> Result<EventStreams> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        // Errors are reported as Failed events; nothing is ever sent here.
        let (_err_tx, err_rx) = mpsc::channel(1);
        self.with_entry(instance, |entry| {
            let state = entry.instance.status.state;
            if state != MachineState::Pending {
                let _ = tx.try_send(MachineEvent::new(state));
            }
            if !state.is_terminal() {
                entry.subscribers.push(tx);
            }
        })?;
        Ok(Streams::new(rx, err_rx))
    }

    async fn logs(&self, _cancel: &CancellationToken, instance: &Instance) -> Result<LogStreams> {
        self.with_entry(instance, |entry| entry.logs.take())?
            .ok_or_else(|| anyhow::anyhow!("logs of {} are not available", instance.name))
    }

    async fn stop(&self, cancel: &CancellationToken, instance: &Instance) -> Result<Instance> {
        let (kill, waiter) =
            self.with_entry(instance, |entry| (entry.kill.clone(), entry.waiter.take()))?;
        kill.cancel();
        if let Some(waiter) = waiter {
            tokio::select! {
                res = waiter => res.context("qemu waiter task failed")?,
                () = cancel.cancelled() => anyhow::bail!("cancelled while stopping {}", instance.name),
            }
        }
        self.with_entry(instance, |entry| entry.instance.clone())
    }

    async fn delete(&self, _cancel: &CancellationToken, instance: &Instance) -> Result<Instance> {
        let uid = instance
            .uid
            .ok_or_else(|| anyhow::anyhow!("instance {} was never created", instance.name))?;
        let entry = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&uid)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {} ({uid})", instance.name))?;
        entry.kill.cancel();

        if let Some(dir) = &entry.instance.status.state_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("cannot remove {}", dir.display()));
                }
            }
        }
        Ok(entry.instance)
    }
}

async fn broadcast(subscribers: &[mpsc::Sender<MachineEvent>], event: MachineEvent) {
    for tx in subscribers {
        let _ = tx.send(event.clone()).await;
    }
}

/// Record a terminal event and deliver it to every subscriber, closing
/// their streams afterwards.
async fn publish(registry: &Registry, uid: Uuid, event: MachineEvent) {
    let subscribers = {
        let mut map = registry.lock().unwrap_or_else(PoisonError::into_inner);
        match map.get_mut(&uid) {
            Some(entry) => {
                entry.instance.status.state = event.state;
                entry.instance.status.error.clone_from(&event.error);
                std::mem::take(&mut entry.subscribers)
            }
            None => return,
        }
    };
    tracing::debug!(%uid, state = %event.state, "qemu process ended");
    broadcast(&subscribers, event).await;
}

/// Extract the version from `qemu-system-* --version` output, e.g.
/// `QEMU emulator version 8.2.2 (Debian 1:8.2.2+ds-0ubuntu1)`.
#[must_use]
pub fn parse_qemu_version(output: &str) -> Option<semver::Version> {
    let raw = output
        .split_whitespace()
        .skip_while(|w| *w != "version")
        .nth(1)?;
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<&str> = numeric.split('.').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }
    parts.resize(3, "0");
    semver::Version::parse(&parts[..3].join(".")).ok()
}

/// Command line for `instance`.
#[must_use]
pub fn qemu_args(instance: &Instance, config: &QemuConfig) -> Vec<String> {
    let spec = &instance.spec;
    let mut args: Vec<String> = vec!["-nographic".into(), "-no-reboot".into()];

    if matches!(spec.architecture, Architecture::Arm64 | Architecture::Arm) {
        args.extend(["-machine".into(), "virt".into()]);
        let cpu = if spec.architecture == Architecture::Arm64 { "cortex-a53" } else { "cortex-a15" };
        args.extend(["-cpu".into(), cpu.into()]);
    }

    args.extend([
        "-kernel".into(),
        instance.status.kernel_path.display().to_string(),
    ]);

    if let Some(memory) = &spec.resources.memory {
        args.extend(["-m".into(), format!("{}M", memory.mebibytes())]);
    }

    let mut cmdline = spec.kernel_args.join(" ");
    if !spec.app_args.is_empty() {
        if !cmdline.is_empty() {
            cmdline.push(' ');
        }
        cmdline.push_str("-- ");
        cmdline.push_str(&spec.app_args.join(" "));
    }
    if !cmdline.is_empty() {
        args.extend(["-append".into(), cmdline]);
    }

    if let Some(initrd) = &instance.status.initrd_path {
        args.extend(["-initrd".into(), initrd.display().to_string()]);
    } else if let Some(rootfs) = &spec.rootfs {
        tracing::debug!(%rootfs, "rootfs is not an initrd, not attached");
    }

    if !spec.emulation {
        args.extend(["-accel".into(), "kvm".into()]);
    }

    args.extend(config.extra_args.iter().cloned());
    args
}
