//! Run command: select a project target and run it to completion.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::app::AppContext;
use crate::application::services::execute::{ExecuteDeps, ExecuteOptions, execute};
use crate::commands::{FilterArgs, ProjectArgs, non_empty, non_empty_path};
use crate::domain::spec::SpecOverrides;
use crate::infra::chooser::DialoguerChooser;
use crate::infra::config::runtime_dir;
use crate::infra::fs::StdFs;
use crate::infra::initrd::CpioArchiver;
use crate::infra::project::KraftfileLoader;
use crate::infra::qemu::QemuBackend;
use crate::output::{StdoutSink, TerminalReporter, json};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Kernel arguments
    #[arg(long = "args", value_name = "ARG", env = "INPUT_ARGS", value_delimiter = ' ')]
    pub kernel_args: Vec<String>,

    /// Memory to assign, e.g. 64Mi
    #[arg(long, short = 'M', env = "INPUT_MEMORY")]
    pub memory: Option<String>,

    /// Name of the instance
    #[arg(long, env = "INPUT_NAME")]
    pub name: Option<String>,

    /// Initramfs: an archive, a directory, or a host:guest mapping
    #[arg(long, env = "INPUT_INITRD")]
    pub initrd: Option<String>,

    /// Project directory, then arguments passed to the application
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Split positional arguments into the project directory and application
/// arguments. The first positional names the project directory only when
/// `--workdir` is unset and it is an existing directory.
#[must_use]
pub fn split_positional(workdir: Option<PathBuf>, args: &[String]) -> (PathBuf, Vec<String>) {
    if let Some(dir) = workdir {
        return (dir, args.to_vec());
    }
    match args.split_first() {
        Some((first, rest)) if Path::new(first).is_dir() => (PathBuf::from(first), rest.to_vec()),
        _ => (PathBuf::from("."), args.to_vec()),
    }
}

/// Entry point for `unirun run`.
///
/// # Errors
///
/// Returns the run's `RunError` (wrapped in `anyhow`) when the instance did
/// not exit cleanly, or a configuration error.
pub async fn run(app: &AppContext, args: RunArgs, cancel: &CancellationToken) -> Result<()> {
    let (workdir, app_args) = split_positional(non_empty_path(args.project.workdir), &args.args);

    let opts = ExecuteOptions {
        workdir,
        kraftfile: non_empty(args.project.kraftfile),
        filters: args.filter.filters(),
        overrides: SpecOverrides {
            kernel_args: args.kernel_args.into_iter().filter(|a| !a.is_empty()).collect(),
            app_args,
            memory: non_empty(args.memory),
            name: non_empty(args.name),
            emulation: app.config.run.emulation,
        },
        initrd: non_empty(args.initrd),
        runtime_dir: runtime_dir(&app.config)?,
        no_prompt: app.non_interactive,
        teardown_timeout: app.config.run.teardown_timeout(),
    };
    tracing::debug!(?opts, "run options");

    let backend = QemuBackend::new(app.config.qemu.clone());
    let chooser = DialoguerChooser::new(app.non_interactive);
    let reporter = TerminalReporter::new(&app.output);
    let deps = ExecuteDeps {
        project: &KraftfileLoader,
        chooser: &chooser,
        initrd: &CpioArchiver,
        fs: &StdFs,
        backend: &backend,
        sink: &StdoutSink,
        reporter: &reporter,
    };

    let instance = execute(cancel, &deps, opts).await?;

    if app.is_json() {
        println!("{}", json::format_instance(&instance)?);
    } else {
        app.output.success(&format!("instance {} exited", instance.name));
    }
    Ok(())
}
