use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use ams_installer::{install, InstallOptions};
use ams_lock::InstallStatus;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Run `install` (offline-first) or `update` (remote probe).
pub(crate) async fn reconcile(
    project_root: &Path,
    names: Vec<String>,
    force: bool,
    remote_probe: bool,
    mut printer: Printer,
) -> Result<ExitStatus> {
    let targets = if names.is_empty() {
        None
    } else {
        Some(names.into_iter().collect::<BTreeSet<String>>())
    };
    let options = InstallOptions {
        force,
        remote_probe,
        targets,
    };

    let report = install(project_root, &options).await?;

    for result in &report.results {
        let label = match result.status {
            InstallStatus::Installed => format!("{}", "installed".green()),
            InstallStatus::Updated => format!("{}", "updated".cyan()),
            InstallStatus::UpToDate => format!("{}", "up to date".dimmed()),
            InstallStatus::Error => format!("{}", "error".red().bold()),
            InstallStatus::Skipped => format!("{}", "skipped".dimmed()),
        };
        match &result.detail {
            Some(detail) => writeln!(printer, "{} {label} ({detail})", result.name.bold())?,
            None => writeln!(printer, "{} {label}", result.name.bold())?,
        }
    }

    if report.any_errors() {
        Ok(ExitStatus::Failure)
    } else {
        Ok(ExitStatus::Success)
    }
}
