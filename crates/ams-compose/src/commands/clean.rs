use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use ams_installer::CleanOptions;
use ams_lock::{LockFile, Manifest};

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Prune unreferenced mirrors and remove orphaned libraries.
pub(crate) fn clean(project_root: &Path, mut printer: Printer) -> Result<ExitStatus> {
    let manifest = Manifest::load(project_root)?;
    let mut lock = LockFile::load(project_root)?;

    let report = ams_installer::clean(
        project_root,
        &manifest,
        &mut lock,
        &CleanOptions {
            remove_orphans: true,
        },
    )?;

    for digest in &report.removed_mirrors {
        writeln!(printer, "removed mirror {digest}")?;
    }
    for name in &report.removed_orphans {
        writeln!(printer, "removed orphaned library {}", name.bold())?;
    }
    for (name, reason) in &report.kept_orphans {
        writeln!(
            printer,
            "{} orphaned library {} kept: {reason}",
            "warning".yellow().bold(),
            name.bold(),
        )?;
    }
    if report.removed_mirrors.is_empty()
        && report.removed_orphans.is_empty()
        && report.kept_orphans.is_empty()
    {
        writeln!(printer, "Nothing to clean.")?;
    }

    // Orphans we refused to touch are unresolved state, not success.
    if report.kept_orphans.is_empty() {
        Ok(ExitStatus::Success)
    } else {
        Ok(ExitStatus::Failure)
    }
}
