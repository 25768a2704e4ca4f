//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;
use crate::infra::config::YamlConfigStore;
use crate::infra::{logging, signal};

/// Run unikernel project targets to completion
#[derive(Parser)]
#[command(
    name = "unirun",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Never prompt; fail on ambiguous choices instead
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Diagnostic log filter, e.g. `debug` or `unirun=trace`
    #[arg(long, global = true, env = "INPUT_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a project target until it exits
    Run(commands::run::RunArgs),

    /// List the targets of a project
    Targets(commands::targets::TargetsArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            log_level,
            command,
        } = self;

        if let Command::Version = command {
            commands::version::run(json);
            return Ok(());
        }

        let config = YamlConfigStore.load()?;
        logging::init(
            log_level.as_deref().filter(|l| !l.is_empty()),
            &config.log,
        );

        let app = AppContext::new(
            &AppFlags {
                output: OutputFlags {
                    no_color,
                    quiet,
                    json,
                },
                behaviour: BehaviourFlags { yes },
            },
            config,
        );

        match command {
            Command::Run(args) => {
                let cancel = CancellationToken::new();
                let listener = signal::spawn_shutdown_listener(cancel.clone());
                let result = commands::run::run(&app, args, &cancel).await;
                listener.abort();
                result
            }
            Command::Targets(args) => commands::targets::run(&app, &args),
            Command::Version => Ok(()),
        }
    }
}
