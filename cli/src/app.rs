//! Application context: unified state passed to every command handler.
//!
//! `AppContext` gathers output mode, configuration and non-interactivity once
//! so command handlers never re-derive them.

use crate::domain::config::UnirunConfig;
use crate::output::OutputContext;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `UNIRUN_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Loaded configuration file, or defaults.
    pub config: UnirunConfig,
    /// When `true`, never prompt.
    ///
    /// Set when `--yes` / `-y` is passed, when the `CI` or `UNIRUN_YES`
    /// environment variables are present, or by `no_prompt` in the config.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags and configuration.
    #[must_use]
    pub fn new(flags: &AppFlags, config: UnirunConfig) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("UNIRUN_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env || config.no_prompt;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet || flags.output.json),
            mode,
            config,
            non_interactive,
        }
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }
}
