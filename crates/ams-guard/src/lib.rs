//! The security boundary: every user-supplied destination path and repository
//! URL passes through here before any filesystem or network I/O is attempted.
//!
//! Validation is strictly lexical. Paths are normalized without following
//! symlinks (following them would introduce a check-then-use race), and URLs
//! are never resolved.

use std::path::{Component, Path, PathBuf};

use tracing::trace;

/// Environment variable that admits `file://` repository URLs. Set by the
/// test harness only; never surfaced as a CLI flag.
pub const TEST_MODE_ENV: &str = "AMS_COMPOSE_TEST_MODE";

/// URL schemes accepted for repository imports.
const ALLOWED_SCHEMES: &[&str] = &["https", "ssh", "git", "git+https", "git+ssh"];

/// Shell metacharacters that must never appear in a repository URL handed to
/// a subprocess.
const FORBIDDEN: &[&str] = &[";", "|", "`", "$(", "\n", "\r"];

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("`{candidate}` escapes the project root")]
    PathEscape { candidate: String },
    #[error("`{candidate}` must be a relative path")]
    AbsolutePath { candidate: String },
    #[error("unsafe repository URL `{url}`: {reason}")]
    UnsafeUrl { url: String, reason: String },
}

/// Whether `file://` repository URLs are admitted in this process.
pub fn test_mode() -> bool {
    std::env::var(TEST_MODE_ENV).is_ok_and(|value| value == "1")
}

/// Resolve the destination directory for a library.
///
/// The candidate is `local_path` when given, else `{library_root}/{name}`. It
/// must be relative, and after lexical `.`/`..` normalization must land
/// strictly inside (not at) the project root.
pub fn resolve_library_path(
    project_root: &Path,
    library_root: &str,
    name: &str,
    local_path: Option<&str>,
) -> Result<PathBuf, GuardError> {
    let candidate = match local_path {
        Some(path) => path.to_owned(),
        None => format!("{library_root}/{name}"),
    };

    let (normalized, depth) = normalize(&candidate)?;
    if depth == 0 {
        // Normalized away to the project root itself.
        return Err(GuardError::PathEscape { candidate });
    }

    let resolved = project_root.join(normalized);
    trace!("resolved library `{name}` to `{}`", resolved.display());
    Ok(resolved)
}

/// Resolve `relative` against `root`, requiring containment. Unlike
/// [`resolve_library_path`], landing at `root` itself is allowed; an
/// extraction `source_path` of `.` means the whole tree.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, GuardError> {
    let (normalized, _) = normalize(relative)?;
    Ok(root.join(normalized))
}

/// Lexically normalize a relative path, tracking how deep under the base the
/// result lands. A `..` that pops past the base is an escape regardless of
/// what later components add back.
fn normalize(candidate: &str) -> Result<(PathBuf, usize), GuardError> {
    let relative = Path::new(candidate);
    if relative.is_absolute() || has_windows_prefix(relative) {
        return Err(GuardError::AbsolutePath {
            candidate: candidate.to_owned(),
        });
    }

    let mut normalized = PathBuf::new();
    let mut depth = 0usize;
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(GuardError::PathEscape {
                        candidate: candidate.to_owned(),
                    });
                }
                normalized.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(GuardError::AbsolutePath {
                    candidate: candidate.to_owned(),
                });
            }
        }
    }
    Ok((normalized, depth))
}

/// Validate a repository URL lexically against the accepted schemes.
///
/// `file://` is admitted only in test mode. No DNS resolution, no filesystem
/// probing; anything that git might interpret as a local path is rejected.
pub fn validate_repo_url(url: &str, test_mode: bool) -> Result<(), GuardError> {
    let unsafe_url = |reason: &str| GuardError::UnsafeUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    if url.trim().is_empty() {
        return Err(unsafe_url("empty URL"));
    }
    if let Some(meta) = FORBIDDEN.iter().find(|meta| url.contains(*meta)) {
        return Err(unsafe_url(&format!("contains `{}`", meta.escape_default())));
    }
    if url.starts_with('-') {
        // Would be parsed as an option by the git subprocess.
        return Err(unsafe_url("starts with `-`"));
    }

    if let Some((scheme, rest)) = url.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if scheme == "file" {
            if test_mode {
                return Ok(());
            }
            return Err(unsafe_url("file:// URLs are not allowed"));
        }
        if !ALLOWED_SCHEMES.contains(&scheme.as_str()) {
            return Err(unsafe_url(&format!("scheme `{scheme}` is not allowed")));
        }
        if rest.is_empty() {
            return Err(unsafe_url("missing host"));
        }
        return Ok(());
    }

    // No scheme: the only accepted spelling is git's ssh shorthand
    // `[user@]host:owner/name`. Anything else is a local path in git's eyes.
    if is_scp_shorthand(url) {
        return Ok(());
    }
    Err(unsafe_url(
        "expected an https/ssh/git URL or `host:owner/name` shorthand",
    ))
}

/// `[user@]host:path`, where the colon comes before any slash.
fn is_scp_shorthand(url: &str) -> bool {
    let head = url.split('/').next().unwrap_or(url);
    let Some((host, path_head)) = head.split_once(':') else {
        return false;
    };
    let host = host.rsplit('@').next().unwrap_or(host);
    // Single-letter "hosts" are more plausibly Windows drive letters.
    host.len() > 1 && !path_head.is_empty()
}

fn has_windows_prefix(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_destination_is_under_library_root() {
        let root = Path::new("/proj");
        let resolved = resolve_library_path(root, "designs/libs", "widget", None).unwrap();
        assert_eq!(resolved, Path::new("/proj/designs/libs/widget"));
    }

    #[test]
    fn local_path_override() {
        let root = Path::new("/proj");
        let resolved =
            resolve_library_path(root, "designs/libs", "widget", Some("ip/widget")).unwrap();
        assert_eq!(resolved, Path::new("/proj/ip/widget"));
    }

    #[test]
    fn dotted_segments_normalize() {
        let root = Path::new("/proj");
        let resolved =
            resolve_library_path(root, "designs/libs", "widget", Some("./a/b/../c")).unwrap();
        assert_eq!(resolved, Path::new("/proj/a/c"));
    }

    #[test]
    fn escapes_are_rejected() {
        let root = Path::new("/proj");
        for candidate in ["../outside", "../../etc", "a/../../b", "a/../.."] {
            let err = resolve_library_path(root, "designs/libs", "widget", Some(candidate))
                .unwrap_err();
            assert!(matches!(err, GuardError::PathEscape { .. }), "{candidate}");
        }
    }

    #[test]
    fn absolute_paths_are_rejected() {
        let root = Path::new("/proj");
        let err = resolve_library_path(root, "designs/libs", "widget", Some("/etc/passwd"))
            .unwrap_err();
        assert!(matches!(err, GuardError::AbsolutePath { .. }));
    }

    #[test]
    fn project_root_itself_is_rejected() {
        let root = Path::new("/proj");
        let err = resolve_library_path(root, "designs/libs", "widget", Some(".")).unwrap_err();
        assert!(matches!(err, GuardError::PathEscape { .. }));
    }

    #[test]
    fn resolve_within_allows_the_root() {
        let root = Path::new("/mirror/abc");
        assert_eq!(resolve_within(root, ".").unwrap(), root);
        assert_eq!(
            resolve_within(root, "src/widget").unwrap(),
            Path::new("/mirror/abc/src/widget")
        );
        assert!(resolve_within(root, "../sibling").is_err());
    }

    #[test]
    fn accepted_schemes() {
        for url in [
            "https://github.com/org/repo.git",
            "ssh://git@github.com/org/repo",
            "git://example.com/repo",
            "git+https://example.com/repo",
            "git+ssh://example.com/repo",
            "git@github.com:org/repo.git",
            "example.com:org/repo",
        ] {
            validate_repo_url(url, false).unwrap_or_else(|err| panic!("{url}: {err}"));
        }
    }

    #[test]
    fn rejected_urls() {
        for url in [
            "file:///tmp/x",
            "http://example.com/repo",
            "ftp://example.com/repo",
            "/tmp/local",
            "./relative",
            "-upload-pack=/bin/sh",
            "https://example.com/repo;rm -rf /",
            "https://example.com/repo`id`",
            "https://example.com/$(id)",
        ] {
            assert!(validate_repo_url(url, false).is_err(), "{url}");
        }
    }

    #[test]
    fn file_urls_allowed_in_test_mode() {
        validate_repo_url("file:///tmp/fixture", true).unwrap();
        assert!(validate_repo_url("file:///tmp/fixture", false).is_err());
    }
}
