use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use ams_installer::validate_installation;
use ams_lock::{LockFile, Manifest, ValidationStatus};

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Recompute checksums and surface orphans.
pub(crate) fn validate(project_root: &Path, mut printer: Printer) -> Result<ExitStatus> {
    let manifest = Manifest::load(project_root)?;
    let mut lock = LockFile::load(project_root)?;

    let report = validate_installation(project_root, &manifest, &mut lock);

    for result in &report.results {
        let label = match result.status {
            ValidationStatus::Valid => format!("{}", "valid".green()),
            ValidationStatus::Modified => format!("{}", "modified".yellow().bold()),
            ValidationStatus::Missing => format!("{}", "missing".red()),
            ValidationStatus::Orphaned => format!("{}", "orphaned".yellow()),
            ValidationStatus::Error => format!("{}", "error".red().bold()),
            ValidationStatus::NotInstalled => format!("{}", "not installed".dimmed()),
        };
        match &result.detail {
            Some(detail) => writeln!(printer, "{} {label} ({detail})", result.name.bold())?,
            None => writeln!(printer, "{} {label}", result.name.bold())?,
        }
    }

    if report.all_valid() {
        Ok(ExitStatus::Success)
    } else {
        Ok(ExitStatus::Failure)
    }
}
