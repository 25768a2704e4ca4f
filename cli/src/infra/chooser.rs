//! Interactive target choice: implements `TargetChooser`.

use std::io::IsTerminal as _;

use anyhow::{Context, Result};
use console::Term;
use unirun_common::Target;

use crate::application::ports::TargetChooser;

/// Prompts with a `dialoguer` selection list on the terminal.
pub struct DialoguerChooser {
    enabled: bool,
}

impl DialoguerChooser {
    /// `non_interactive` (from `--yes`, `CI` or `UNIRUN_YES`) disables the
    /// prompt; so does a non-terminal stdin or stderr.
    #[must_use]
    pub fn new(non_interactive: bool) -> Self {
        let enabled =
            !non_interactive && Term::stderr().is_term() && std::io::stdin().is_terminal();
        Self { enabled }
    }
}

impl TargetChooser for DialoguerChooser {
    fn is_interactive(&self) -> bool {
        self.enabled
    }

    fn choose(&self, targets: &[Target]) -> Result<usize> {
        let items: Vec<String> = targets.iter().map(label).collect();
        dialoguer::Select::new()
            .with_prompt("select target")
            .items(&items)
            .default(0)
            .interact_on(&Term::stderr())
            .context("target prompt failed")
    }
}

/// `name (plat/arch)`
#[must_use]
pub fn label(target: &Target) -> String {
    format!("{} ({}/{})", target.name, target.platform, target.architecture)
}
