use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};

use ams_git::MirrorCache;
use ams_lock::{LockFile, Manifest, Provenance};

use crate::InstallerError;

/// Knobs for a cleanup pass.
#[derive(Debug, Default, Clone)]
pub struct CleanOptions {
    /// Also delete orphaned library directories (with their lock entries).
    pub remove_orphans: bool,
}

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Mirror digests whose directories were removed.
    pub removed_mirrors: Vec<String>,
    /// Orphaned libraries removed from disk and lock.
    pub removed_orphans: Vec<String>,
    /// Orphans left in place, with the reason.
    pub kept_orphans: Vec<(String, String)>,
}

/// Prune mirrors no lock entry references, and optionally remove orphaned
/// libraries.
///
/// An orphaned directory is only deleted when it still carries a provenance
/// record matching its stale lock entry; a directory the user created (or
/// repurposed) by hand is never touched.
pub fn clean(
    project_root: &Path,
    manifest: &Manifest,
    lock: &mut LockFile,
    options: &CleanOptions,
) -> Result<CleanReport, InstallerError> {
    let mirrors = MirrorCache::new(project_root);
    let mut report = CleanReport::default();

    let mut cache_lock = mirrors.lock().map_err(InstallerError::CacheLock)?;
    let _cache_guard = cache_lock.write().map_err(InstallerError::CacheLock)?;

    // Orphans go first so their mirrors count as unreferenced below.
    if options.remove_orphans {
        remove_orphans(project_root, manifest, lock, &mut report)?;
        lock.save(project_root)?;
    }

    prune_mirrors(&mirrors, lock, &mut report)?;

    Ok(report)
}

fn prune_mirrors(
    mirrors: &MirrorCache,
    lock: &LockFile,
    report: &mut CleanReport,
) -> Result<(), InstallerError> {
    let referenced: BTreeSet<String> = lock
        .libraries
        .values()
        .filter_map(|entry| ams_cache_key::repo_url_digest(&entry.repo).ok())
        .collect();

    let root = mirrors.root();
    if !root.is_dir() {
        return Ok(());
    }

    for entry in fs_err::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // Staging leftovers from an interrupted clone are unreferenced too.
        if referenced.contains(&name) {
            continue;
        }
        debug!("removing unreferenced mirror `{name}`");
        ams_fs::rm_rf(entry.path())?;
        report.removed_mirrors.push(name);
    }
    Ok(())
}

fn remove_orphans(
    project_root: &Path,
    manifest: &Manifest,
    lock: &mut LockFile,
    report: &mut CleanReport,
) -> Result<(), InstallerError> {
    let orphans: Vec<String> = lock
        .libraries
        .keys()
        .filter(|name| !manifest.imports.contains_key(*name))
        .cloned()
        .collect();

    for name in orphans {
        let Some(entry) = lock.get(&name).cloned() else {
            continue;
        };
        let dest = project_root.join(&entry.local_path);

        if !dest.is_dir() {
            // Nothing on disk; drop the stale entry.
            lock.remove(&name);
            report.removed_orphans.push(name);
            continue;
        }

        match Provenance::load(&dest) {
            Ok(provenance)
                if provenance.library == name && provenance.repo == entry.repo =>
            {
                ams_fs::rm_rf(&dest)?;
                lock.remove(&name);
                report.removed_orphans.push(name);
            }
            Ok(_) => {
                warn!("`{}` provenance does not match its lock entry", name);
                report.kept_orphans.push((
                    name,
                    String::from("provenance does not match the lock entry"),
                ));
            }
            Err(_) => {
                report.kept_orphans.push((
                    name,
                    String::from("no provenance record; refusing to delete"),
                ));
            }
        }
    }
    Ok(())
}
