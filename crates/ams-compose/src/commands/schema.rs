use std::fmt::Write;

use anyhow::Result;

use ams_lock::Manifest;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Emit the manifest's JSON schema.
pub(crate) fn schema(mut printer: Printer) -> Result<ExitStatus> {
    let schema = schemars::schema_for!(Manifest);
    writeln!(printer, "{}", serde_json::to_string_pretty(&schema)?)?;
    Ok(ExitStatus::Success)
}
