use std::collections::BTreeSet;
use std::path::Path;

use jiff::Timestamp;
use tracing::{debug, warn};

use ams_extract::{extract, ExtractRequest};
use ams_git::MirrorCache;
use ams_lock::{ImportSpec, InstallStatus, LockEntry, LockFile, Manifest};

use crate::plan::{plan, Action, PlanOptions, PlannedLibrary};
use crate::InstallerError;

/// Knobs for one install/update run.
#[derive(Debug, Default, Clone)]
pub struct InstallOptions {
    pub force: bool,
    /// `update` probes remotes; `install` stays offline when it can.
    pub remote_probe: bool,
    pub targets: Option<BTreeSet<String>>,
}

/// Per-library outcome, in manifest order.
#[derive(Debug, Clone)]
pub struct LibraryResult {
    pub name: String,
    pub status: InstallStatus,
    /// Diagnostic or noteworthy detail for the status line.
    pub detail: Option<String>,
}

/// The whole run's outcome.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub results: Vec<LibraryResult>,
}

impl InstallReport {
    /// Whether any library failed.
    pub fn any_errors(&self) -> bool {
        self.results
            .iter()
            .any(|result| result.status == InstallStatus::Error)
    }
}

/// Reconcile the project: plan, execute library-by-library, persist the lock.
///
/// Libraries are processed in manifest declaration order, strictly one at a
/// time. A failing library is recorded and skipped over; the lock file is
/// written once at the end and reflects every library that succeeded.
pub async fn install(
    project_root: &Path,
    options: &InstallOptions,
) -> Result<InstallReport, InstallerError> {
    let manifest = Manifest::load(project_root)?;
    let mut lock = LockFile::load(project_root)?;
    let mirrors = MirrorCache::new(project_root);

    if manifest.imports.is_empty() {
        debug!("manifest has no imports; nothing to do");
        return Ok(InstallReport::default());
    }

    // One tool invocation at a time may mutate the mirror cache.
    let mut cache_lock = mirrors.lock().map_err(InstallerError::CacheLock)?;
    let _cache_guard = cache_lock.write().map_err(InstallerError::CacheLock)?;

    let plan_options = PlanOptions {
        force: options.force,
        remote_probe: options.remote_probe,
        targets: options.targets.clone(),
    };
    let planned = plan(project_root, &manifest, &lock, &mirrors, &plan_options).await;

    let mut report = InstallReport::default();
    for library in &planned.libraries {
        let result = match &library.action {
            Action::Skip => LibraryResult {
                name: library.name.clone(),
                status: InstallStatus::Skipped,
                detail: None,
            },
            Action::Error(message) => {
                if let Some(entry) = lock.libraries.get_mut(&library.name) {
                    entry.install_status = Some(InstallStatus::Error);
                }
                LibraryResult {
                    name: library.name.clone(),
                    status: InstallStatus::Error,
                    detail: Some(message.clone()),
                }
            }
            Action::UpToDate => {
                if let Some(entry) = lock.libraries.get_mut(&library.name) {
                    entry.install_status = Some(InstallStatus::UpToDate);
                }
                LibraryResult {
                    name: library.name.clone(),
                    status: InstallStatus::UpToDate,
                    detail: None,
                }
            }
            Action::Install | Action::Update => {
                let spec = &manifest.imports[&library.name];
                match materialize(
                    project_root,
                    &mirrors,
                    &mut lock,
                    library,
                    spec,
                    options.remote_probe && !library.probed,
                )
                .await
                {
                    Ok(result) => result,
                    Err(message) => {
                        if let Some(entry) = lock.libraries.get_mut(&library.name) {
                            entry.install_status = Some(InstallStatus::Error);
                        }
                        LibraryResult {
                            name: library.name.clone(),
                            status: InstallStatus::Error,
                            detail: Some(message),
                        }
                    }
                }
            }
        };
        report.results.push(result);
    }

    // Successes are committed even when a sibling library failed.
    lock.save(project_root)?;
    Ok(report)
}

/// Drive mirror -> extraction -> lock entry for one library. Any error is
/// flattened to the diagnostic string that ends up in the result map.
async fn materialize(
    project_root: &Path,
    mirrors: &MirrorCache,
    lock: &mut LockFile,
    library: &PlannedLibrary,
    spec: &ImportSpec,
    remote_probe: bool,
) -> Result<LibraryResult, String> {
    let name = library.name.as_str();
    let dest = library
        .dest
        .as_ref()
        .ok_or_else(|| String::from("destination was not resolved"))?;

    let checkout = mirrors
        .ensure(&spec.repo, &spec.reference, remote_probe)
        .await
        .map_err(|err| render(&err))?;

    let extraction = extract(&ExtractRequest {
        name,
        spec,
        project_root,
        mirror: &checkout.mirror,
        commit: &checkout.commit,
        dest,
    })
    .map_err(|err| render(&err))?;

    if extraction.nested_manifest {
        warn!(
            "`{name}` contains its own ams-compose manifest; nested imports are not resolved"
        );
    }

    let previous = lock.get(name).cloned();
    let updating = library.action == Action::Update && previous.is_some();
    let now = Timestamp::now();

    // A changed upstream license is worth flagging, but never fatal.
    let license_change = previous.as_ref().and_then(|prior| {
        if prior.license != extraction.license {
            Some(format!(
                "license changed from {} to {}",
                prior.license.as_deref().unwrap_or("none"),
                extraction.license.as_deref().unwrap_or("none"),
            ))
        } else {
            None
        }
    });

    let status = if updating {
        InstallStatus::Updated
    } else {
        InstallStatus::Installed
    };
    let entry = LockEntry {
        repo: spec.repo.clone(),
        reference: spec.reference.clone(),
        source_path: spec.source_path.clone(),
        local_path: dest
            .strip_prefix(project_root)
            .unwrap_or(dest)
            .to_string_lossy()
            .into_owned(),
        checkin: spec.checkin,
        commit: checkout.commit.clone(),
        checksum: extraction.checksum.clone(),
        // The original install time survives updates.
        installed_at: previous
            .as_ref()
            .filter(|_| updating)
            .map_or(now, |prior| prior.installed_at),
        updated_at: now,
        license: extraction.license.clone(),
        license_file: extraction.license_file.clone(),
        install_status: Some(status),
        validation_status: None,
        license_change: license_change.clone(),
        license_warning: extraction.license_warning.clone(),
    };
    lock.upsert(name, entry);

    let detail = license_change
        .or(extraction.license_warning)
        .or_else(|| {
            extraction
                .nested_manifest
                .then(|| String::from("contains a nested ams-compose manifest (not resolved)"))
        });
    Ok(LibraryResult {
        name: name.to_owned(),
        status,
        detail,
    })
}

/// Render an error chain into one diagnostic line.
fn render(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
