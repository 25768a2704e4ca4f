//! Targets command: list the project targets a run could select.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize as _;
use serde::Serialize;

use crate::app::AppContext;
use crate::application::ports::ProjectProvider;
use crate::commands::{FilterArgs, ProjectArgs, non_empty, non_empty_path};
use crate::domain::spec::resolve_target_name;
use crate::domain::target;
use crate::infra::project::KraftfileLoader;

/// Arguments for the targets command.
#[derive(Args, Debug)]
pub struct TargetsArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Serialize)]
struct TargetRow {
    name: String,
    platform: String,
    architecture: String,
    kernel: PathBuf,
    built: bool,
}

/// Entry point for `unirun targets`.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or the filters conflict.
pub fn run(app: &AppContext, args: &TargetsArgs) -> Result<()> {
    let filters = args.filter.filters();
    filters.validate()?;

    let workdir = non_empty_path(args.project.workdir.clone()).unwrap_or_else(|| PathBuf::from("."));
    let project = KraftfileLoader.load(&workdir, non_empty(args.project.kraftfile.clone()).as_deref())?;

    let rows: Vec<TargetRow> = target::filter(&project.targets, &filters)
        .into_iter()
        .map(|t| TargetRow {
            name: resolve_target_name(&project.name, &t),
            built: t.kernel.is_file(),
            platform: t.platform,
            architecture: t.architecture,
            kernel: t.kernel,
        })
        .collect();

    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        app.output.warn(&format!("no targets in project {}", project.name));
        return Ok(());
    }

    app.output.header(&project.name);
    for row in &rows {
        let built = if row.built {
            "built".style(app.output.styles.success).to_string()
        } else {
            "not built".style(app.output.styles.warning).to_string()
        };
        println!(
            "  {:<24} {:<20} {built}",
            row.name,
            format!("{}/{}", row.platform, row.architecture),
        );
    }
    Ok(())
}
