//! Project files (`Kraftfile`): implements `ProjectProvider`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use unirun_common::Target;

use crate::application::ports::{Project, ProjectProvider};

/// File names probed, in order, when no project file is given.
pub const PROJECT_FILES: &[&str] = &["Kraftfile", "kraft.yaml", "kraft.yml"];

#[derive(Debug, Deserialize)]
struct Kraftfile {
    name: Option<String>,
    rootfs: Option<String>,
    #[serde(default)]
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    /// `qemu/x86_64`
    Short(String),
    Full {
        name: Option<String>,
        #[serde(alias = "plat")]
        platform: String,
        #[serde(alias = "arch")]
        architecture: String,
        kernel: Option<PathBuf>,
    },
}

/// Loads projects from Kraftfiles on disk or inline contents.
pub struct KraftfileLoader;

impl ProjectProvider for KraftfileLoader {
    fn load(&self, workdir: &Path, kraftfile: Option<&str>) -> Result<Project> {
        let workdir = std::path::absolute(workdir)
            .with_context(|| format!("cannot resolve {}", workdir.display()))?;

        let (contents, origin) = match kraftfile {
            Some(value) => match existing_file(&workdir, value) {
                Some(path) => (read(&path)?, path.display().to_string()),
                None => (value.to_string(), "inline Kraftfile".to_string()),
            },
            None => {
                let path = PROJECT_FILES
                    .iter()
                    .map(|name| workdir.join(name))
                    .find(|p| p.is_file())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "{} is not a project: none of {} found",
                            workdir.display(),
                            PROJECT_FILES.join(", ")
                        )
                    })?;
                (read(&path)?, path.display().to_string())
            }
        };

        parse(&workdir, &contents).with_context(|| format!("cannot parse {origin}"))
    }
}

fn existing_file(workdir: &Path, value: &str) -> Option<PathBuf> {
    if value.contains('\n') {
        return None;
    }
    let path = Path::new(value);
    [path.to_path_buf(), workdir.join(path)]
        .into_iter()
        .find(|p| p.is_file())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

/// Parse Kraftfile `contents` for a project rooted at `workdir`.
///
/// # Errors
///
/// Returns an error on malformed YAML or a malformed `plat/arch` entry.
pub fn parse(workdir: &Path, contents: &str) -> Result<Project> {
    let file: Kraftfile = serde_yaml::from_str(contents)?;

    let name = file
        .name
        .filter(|n| !n.is_empty())
        .or_else(|| {
            workdir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "unikernel".to_string());

    let targets = file
        .targets
        .into_iter()
        .map(|entry| to_target(workdir, &name, file.rootfs.as_ref(), entry))
        .collect::<Result<Vec<_>>>()?;

    Ok(Project {
        name,
        workdir: workdir.to_path_buf(),
        targets,
    })
}

fn to_target(
    workdir: &Path,
    project: &str,
    rootfs: Option<&String>,
    entry: TargetEntry,
) -> Result<Target> {
    let (name, platform, architecture, kernel) = match entry {
        TargetEntry::Short(short) => {
            let (plat, arch) = short
                .split_once('/')
                .filter(|(p, a)| !p.is_empty() && !a.is_empty())
                .ok_or_else(|| anyhow::anyhow!("invalid target '{short}': expected plat/arch"))?;
            (None, plat.to_string(), arch.to_string(), None)
        }
        TargetEntry::Full {
            name,
            platform,
            architecture,
            kernel,
        } => (name, platform, architecture, kernel),
    };

    let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| project.to_string());
    let kernel = match kernel {
        Some(path) if path.is_absolute() => path,
        Some(path) => workdir.join(path),
        None => workdir
            .join(".unikraft")
            .join("build")
            .join(format!("{project}_{platform}-{architecture}")),
    };

    Ok(Target {
        name,
        architecture,
        platform,
        kernel,
        rootfs: rootfs.cloned(),
    })
}
