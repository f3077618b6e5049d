use std::path::Path;

use tracing::debug;

use ams_extract::checksum_excludes;
use ams_lock::{LockFile, Manifest, ValidationStatus};

/// Per-library validation verdict.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub name: String,
    pub status: ValidationStatus,
    pub detail: Option<String>,
}

/// The whole validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    /// Whether every library verified as `valid`.
    pub fn all_valid(&self) -> bool {
        self.results
            .iter()
            .all(|result| result.status == ValidationStatus::Valid)
    }
}

/// Recompute checksums for every library in the manifest and the lock.
///
/// Libraries present only in the lock are `orphaned`; a destination whose
/// recomputed digest differs from the recorded one is `modified`. Statuses
/// are also written onto the in-memory lock entries (they are ephemeral).
pub fn validate_installation(
    project_root: &Path,
    manifest: &Manifest,
    lock: &mut LockFile,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for name in manifest.imports.keys() {
        let (status, detail) = validate_one(project_root, lock, name);
        if let Some(entry) = lock.libraries.get_mut(name) {
            entry.validation_status = Some(status);
        }
        report.results.push(ValidationResult {
            name: name.clone(),
            status,
            detail,
        });
    }

    // Whatever remains in the lock without a manifest entry is orphaned.
    let orphan_names: Vec<String> = lock
        .libraries
        .keys()
        .filter(|name| !manifest.imports.contains_key(*name))
        .cloned()
        .collect();
    for name in orphan_names {
        if let Some(entry) = lock.libraries.get_mut(&name) {
            entry.validation_status = Some(ValidationStatus::Orphaned);
        }
        report.results.push(ValidationResult {
            name,
            status: ValidationStatus::Orphaned,
            detail: Some(String::from("present in lock but not in manifest")),
        });
    }

    report
}

fn validate_one(
    project_root: &Path,
    lock: &LockFile,
    name: &str,
) -> (ValidationStatus, Option<String>) {
    let Some(entry) = lock.get(name) else {
        return (ValidationStatus::NotInstalled, None);
    };

    let dest = project_root.join(&entry.local_path);
    if !dest.is_dir() {
        return (
            ValidationStatus::Missing,
            Some(format!("`{}` does not exist", entry.local_path)),
        );
    }

    match ams_cache_key::tree_digest(&dest, &checksum_excludes) {
        Ok(digest) if digest == entry.checksum => {
            debug!("`{name}` checksum verified");
            (ValidationStatus::Valid, None)
        }
        Ok(_) => (
            ValidationStatus::Modified,
            Some(String::from("local files differ from the installed state")),
        ),
        Err(err) => (ValidationStatus::Error, Some(err.to_string())),
    }
}
