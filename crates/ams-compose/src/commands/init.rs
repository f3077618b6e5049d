use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use ams_lock::{Manifest, MANIFEST_FILE};

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Scaffold a commented manifest. Never overwrites an existing one.
pub(crate) fn init(project_root: &Path, mut printer: Printer) -> Result<ExitStatus> {
    let path = project_root.join(MANIFEST_FILE);
    if path.exists() {
        writeln!(
            printer,
            "{} `{MANIFEST_FILE}` already exists; leaving it alone",
            "warning".yellow().bold(),
        )?;
        return Ok(ExitStatus::Success);
    }

    fs_err::create_dir_all(project_root)?;
    fs_err::write(&path, Manifest::template())
        .with_context(|| format!("failed to write `{}`", path.display()))?;
    writeln!(printer, "Created `{MANIFEST_FILE}`.")?;
    Ok(ExitStatus::Success)
}
