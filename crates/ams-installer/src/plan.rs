use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use ams_git::MirrorCache;
use ams_lock::{LockFile, Manifest};

/// Knobs for one planning pass.
#[derive(Debug, Default, Clone)]
pub struct PlanOptions {
    /// Reinstall everything, unconditionally.
    pub force: bool,
    /// Consult remotes to detect moved mutable refs (the `update` command).
    pub remote_probe: bool,
    /// Restrict the run to these library names.
    pub targets: Option<BTreeSet<String>>,
}

/// What the orchestrator should do for one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fresh install (no usable lock state, identity change, or repair).
    Install,
    /// The pinned ref or resolved commit moved.
    Update,
    /// Nothing to do.
    UpToDate,
    /// Not selected by `targets`.
    Skip,
    /// Pre-flight validation failed; the diagnostic is final.
    Error(String),
}

/// One library's planned action.
#[derive(Debug)]
pub struct PlannedLibrary {
    pub name: String,
    pub action: Action,
    /// Resolved absolute destination (when the guard accepted it).
    pub dest: Option<PathBuf>,
    /// Whether the decision already consulted the remote; lets the
    /// orchestrator skip a second fetch for the same library.
    pub probed: bool,
}

/// The full action set for a run, in manifest declaration order.
#[derive(Debug, Default)]
pub struct Plan {
    pub libraries: Vec<PlannedLibrary>,
}

/// Diff the manifest against the lock (and optionally the remotes) into a
/// minimal per-library action set.
///
/// Deterministic and side-effect free, except that a remote probe is
/// factored through [`MirrorCache`] so its network activity is attributable.
pub async fn plan(
    project_root: &Path,
    manifest: &Manifest,
    lock: &LockFile,
    mirrors: &MirrorCache,
    options: &PlanOptions,
) -> Plan {
    let test_mode = ams_guard::test_mode();
    let mut planned = Vec::with_capacity(manifest.imports.len());

    for (name, spec) in &manifest.imports {
        if let Some(targets) = &options.targets {
            if !targets.contains(name) {
                trace!("`{name}` not in targets; skipping");
                planned.push(PlannedLibrary {
                    name: name.clone(),
                    action: Action::Skip,
                    dest: None,
                    probed: false,
                });
                continue;
            }
        }

        // The security boundary runs before any I/O for this library.
        if let Err(err) = ams_guard::validate_repo_url(&spec.repo, test_mode) {
            planned.push(PlannedLibrary {
                name: name.clone(),
                action: Action::Error(err.to_string()),
                dest: None,
                probed: false,
            });
            continue;
        }
        let dest = match ams_guard::resolve_library_path(
            project_root,
            &manifest.library_root,
            name,
            spec.local_path.as_deref(),
        ) {
            Ok(dest) => dest,
            Err(err) => {
                planned.push(PlannedLibrary {
                    name: name.clone(),
                    action: Action::Error(err.to_string()),
                    dest: None,
                    probed: false,
                });
                continue;
            }
        };

        let (action, probed) =
            decide(project_root, name, spec, lock, &dest, mirrors, options).await;
        debug!("planned `{name}`: {action:?}");
        planned.push(PlannedLibrary {
            name: name.clone(),
            action,
            dest: Some(dest),
            probed,
        });
    }

    Plan { libraries: planned }
}

async fn decide(
    project_root: &Path,
    name: &str,
    spec: &ams_lock::ImportSpec,
    lock: &LockFile,
    dest: &Path,
    mirrors: &MirrorCache,
    options: &PlanOptions,
) -> (Action, bool) {
    if options.force {
        return (Action::Install, false);
    }

    let Some(entry) = lock.get(name) else {
        return (Action::Install, false);
    };

    // Identity fields: a change in any of them makes the previous
    // installation meaningless, so reinstall rather than update.
    let local_path_now = dest.strip_prefix(project_root).unwrap_or(dest);
    if entry.repo != spec.repo
        || entry.source_path != spec.source_path
        || entry.checkin != spec.checkin
        || !same_local_path(&entry.local_path, local_path_now)
    {
        return (Action::Install, false);
    }

    // Repair: the lock says installed, the filesystem disagrees.
    if !dest.is_dir() {
        return (Action::Install, false);
    }

    if entry.reference != spec.reference {
        return (Action::Update, false);
    }

    if options.remote_probe {
        match mirrors
            .resolve_commit(&spec.repo, &spec.reference, true)
            .await
        {
            Ok(commit) if commit == entry.commit => (Action::UpToDate, true),
            Ok(_) => (Action::Update, true),
            Err(err) => (Action::Error(err.to_string()), true),
        }
    } else {
        // Fast path: no network.
        (Action::UpToDate, false)
    }
}

/// Compare the recorded destination against the freshly resolved one,
/// insensitive to `./` spelling differences.
fn same_local_path(recorded: &str, current: &Path) -> bool {
    Path::new(recorded).components().eq(current.components())
}
