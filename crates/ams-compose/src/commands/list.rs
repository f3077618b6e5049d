use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use ams_lock::LockFile;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Render the lock file's entries.
pub(crate) fn list(project_root: &Path, mut printer: Printer) -> Result<ExitStatus> {
    let lock = LockFile::load(project_root)?;

    if lock.libraries.is_empty() {
        writeln!(printer, "No libraries installed.")?;
        return Ok(ExitStatus::Success);
    }

    for (name, entry) in &lock.libraries {
        writeln!(
            printer,
            "{} {} @ {} ({})",
            name.bold(),
            entry.reference,
            &entry.commit[..entry.commit.len().min(12)],
            entry.local_path,
        )?;
        writeln!(
            printer,
            "    repo: {}  license: {}  checkin: {}",
            entry.repo,
            entry.license.as_deref().unwrap_or("none"),
            entry.checkin,
        )?;
    }

    Ok(ExitStatus::Success)
}
