//! Extraction: copy a filtered subpath of a mirror into the consumer
//! project, with provenance, a content checksum, and an atomic swap.
//!
//! The destination is staged as a sibling temp directory and only renamed
//! into place once fully built, so a failed extraction never leaves a
//! half-written library behind.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use ams_ignore::IgnoreFilter;
use ams_lock::{ImportSpec, Provenance, PROVENANCE_FILE};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("source path `{source_path}` does not exist in the repository")]
    SourceMissing { source_path: String },
    #[error("failed to copy `{}`", path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to checksum the extracted tree")]
    ChecksumFailed(#[from] ams_cache_key::ChecksumError),
    #[error(transparent)]
    PathEscape(#[from] ams_guard::GuardError),
    #[error(transparent)]
    Ignore(#[from] ams_ignore::IgnoreError),
    #[error(transparent)]
    License(#[from] ams_license::LicenseError),
    #[error(transparent)]
    Provenance(#[from] ams_lock::ProvenanceError),
    #[error("extraction aborted")]
    Aborted(#[source] std::io::Error),
}

/// Everything the extractor needs to materialize one library.
#[derive(Debug)]
pub struct ExtractRequest<'a> {
    /// Manifest key of the library.
    pub name: &'a str,
    pub spec: &'a ImportSpec,
    pub project_root: &'a Path,
    /// The mirror working copy, already checked out at `commit`.
    pub mirror: &'a Path,
    /// Full commit SHA of the mirror checkout.
    pub commit: &'a str,
    /// Destination directory, already validated by the guard.
    pub dest: &'a Path,
}

/// The result of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Tree digest over the installed files.
    pub checksum: String,
    /// Resolved license identifier (asserted or detected).
    pub license: Option<String>,
    /// License file path relative to the library root.
    pub license_file: Option<String>,
    /// Diagnostic for an unparseable asserted identifier.
    pub license_warning: Option<String>,
    /// Whether the extracted tree carries its own `ams-compose.yaml`.
    pub nested_manifest: bool,
}

/// The exclude predicate shared by install-time and validate-time checksums:
/// the provenance record plus anything carrying a built-in ignored name.
pub fn checksum_excludes(relative: &Path) -> bool {
    if relative.file_name() == Some(std::ffi::OsStr::new(PROVENANCE_FILE)) {
        return true;
    }
    relative
        .components()
        .any(|component| match component.as_os_str().to_str() {
            Some(name) => ams_ignore::is_builtin(name),
            None => false,
        })
}

/// Materialize one library from its mirror.
pub fn extract(request: &ExtractRequest<'_>) -> Result<Extraction, ExtractError> {
    let spec = request.spec;

    let source = ams_guard::resolve_within(request.mirror, &spec.source_path)?;
    if !source.is_dir() {
        return Err(ExtractError::SourceMissing {
            source_path: spec.source_path.clone(),
        });
    }

    let filter = IgnoreFilter::new(request.project_root, &spec.ignore_patterns, spec.checkin)?;
    let staged = ams_fs::StagedDir::for_dest(request.dest).map_err(ExtractError::Aborted)?;

    let mut nested_manifest = false;
    copy_filtered(&source, staged.path(), &filter, &mut nested_manifest)?;

    // A subdirectory extraction leaves the repository's license behind; pull
    // the repo-root license file in so attribution travels with the copy.
    if spec.checkin && spec.source_path.trim_end_matches('/') != "." {
        inject_root_license(request.mirror, staged.path())?;
    }

    let detected = ams_license::scan_dir(staged.path())?;
    let license_warning = spec.license.as_deref().and_then(ams_license::check_asserted);
    let license = spec
        .license
        .clone()
        .or_else(|| detected.as_ref().map(|found| found.identifier.clone()));
    let license_file = detected
        .as_ref()
        .map(|found| found.file.to_string_lossy().into_owned());

    Provenance::new(
        request.name,
        &spec.repo,
        &spec.reference,
        request.commit,
        &spec.source_path,
        spec.checkin,
        license.clone(),
        license_file.clone(),
    )
    .write(staged.path())?;

    let checksum = ams_cache_key::tree_digest(staged.path(), &checksum_excludes)?;

    ams_fs::replace_dir(&staged.keep(), request.dest).map_err(ExtractError::Aborted)?;

    // Written after the swap and the checksum; its name is in the built-in
    // set, so validate-time digests skip it either way.
    if !spec.checkin {
        fs_err::write(
            request.dest.join(".gitignore"),
            format!("*\n!{PROVENANCE_FILE}\n"),
        )
        .map_err(ExtractError::Aborted)?;
    }

    debug!(
        "extracted `{}` to `{}` ({checksum})",
        request.name,
        request.dest.display()
    );
    Ok(Extraction {
        checksum,
        license,
        license_file,
        license_warning,
        nested_manifest,
    })
}

/// Walk `source` through the filter and copy survivors under `dest`.
fn copy_filtered(
    source: &Path,
    dest: &Path,
    filter: &IgnoreFilter,
    nested_manifest: &mut bool,
) -> Result<(), ExtractError> {
    let copy_err = |path: &Path| {
        let path = path.to_path_buf();
        move |err| ExtractError::CopyFailed { path, err }
    };

    let walker = WalkDir::new(source).follow_links(false).into_iter();
    for entry in walker.filter_entry(|entry| {
        let Ok(relative) = entry.path().strip_prefix(source) else {
            return true;
        };
        relative.as_os_str().is_empty()
            || !filter.excludes(relative, entry.file_type().is_dir())
    }) {
        let entry = entry.map_err(|err| ExtractError::CopyFailed {
            path: source.to_path_buf(),
            err: std::io::Error::other(err),
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walked path is under the walk root");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs_err::create_dir_all(&target).map_err(copy_err(&target))?;
        } else if file_type.is_symlink() {
            copy_symlink(source, entry.path(), relative, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs_err::create_dir_all(parent).map_err(copy_err(parent))?;
            }
            // `fs::copy` carries permission bits along with the contents.
            fs_err::copy(entry.path(), &target).map_err(copy_err(entry.path()))?;
            if entry.file_name() == std::ffi::OsStr::new(ams_lock::MANIFEST_FILE) {
                *nested_manifest = true;
            }
        }
    }
    Ok(())
}

/// Recreate a symlink, skipping targets that point outside the extraction
/// source; following those would smuggle foreign files into the project.
fn copy_symlink(
    source: &Path,
    link: &Path,
    relative: &Path,
    target_path: &Path,
) -> Result<(), ExtractError> {
    let target = fs_err::read_link(link).map_err(|err| ExtractError::CopyFailed {
        path: link.to_path_buf(),
        err,
    })?;

    if escapes(relative, &target) {
        warn!(
            "skipping symlink `{}` -> `{}`: target escapes the extraction source",
            relative.display(),
            target.display()
        );
        return Ok(());
    }

    if let Some(parent) = target_path.parent() {
        fs_err::create_dir_all(parent).map_err(|err| ExtractError::CopyFailed {
            path: parent.to_path_buf(),
            err,
        })?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, target_path).map_err(|err| ExtractError::CopyFailed {
        path: target_path.to_path_buf(),
        err,
    })?;
    #[cfg(not(unix))]
    {
        // Portable fallback: materialize the link target's content.
        let resolved = source.join(relative.parent().unwrap_or(Path::new(""))).join(&target);
        fs_err::copy(&resolved, target_path).map_err(|err| ExtractError::CopyFailed {
            path: target_path.to_path_buf(),
            err,
        })?;
    }
    let _ = source;
    Ok(())
}

/// Whether a symlink at `relative` (within the source) pointing at `target`
/// resolves outside the source tree, judged lexically.
fn escapes(relative: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return true;
    }
    let mut depth = relative.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::Normal(_) => depth += 1,
            std::path::Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            _ => return true,
        }
    }
    false
}

/// Copy the repository-root license into the staged tree when the extracted
/// subtree does not already provide a same-named file.
fn inject_root_license(mirror: &Path, staged: &Path) -> Result<(), ExtractError> {
    let Some(found) = ams_license::scan_dir(mirror)? else {
        return Ok(());
    };
    let Some(basename) = found.file.file_name() else {
        return Ok(());
    };
    let target = staged.join(basename);
    if target.exists() {
        return Ok(());
    }
    fs_err::copy(mirror.join(&found.file), &target).map_err(|err| ExtractError::CopyFailed {
        path: target.clone(),
        err,
    })?;
    debug!("preserved repository license `{}`", found.file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_excludes_provenance_and_builtins() {
        assert!(checksum_excludes(Path::new(PROVENANCE_FILE)));
        assert!(checksum_excludes(Path::new(".git/config")));
        assert!(checksum_excludes(Path::new("sub/.gitignore")));
        assert!(checksum_excludes(Path::new(".gitignore")));
        assert!(!checksum_excludes(Path::new("LICENSE")));
        assert!(!checksum_excludes(Path::new("src/cell.sch")));
    }

    #[test]
    fn symlink_escape_detection() {
        // `sub/link -> ../ok` stays inside; `link -> ../out` escapes.
        assert!(!escapes(Path::new("sub/link"), Path::new("../ok")));
        assert!(escapes(Path::new("link"), Path::new("../out")));
        assert!(escapes(Path::new("sub/link"), Path::new("../../out")));
        assert!(escapes(Path::new("link"), Path::new("/etc/passwd")));
        assert!(!escapes(Path::new("link"), Path::new("peer.txt")));
    }
}
