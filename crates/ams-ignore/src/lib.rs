//! Filtering for library extraction.
//!
//! Three tiers apply to every candidate path, most specific first:
//!
//! - per-library patterns from the manifest (`ignore_patterns`),
//! - project-global patterns from `.ams-compose-ignore`,
//! - a built-in set of VCS and tooling names that never belong in an
//!   extracted library.
//!
//! The per-library and project tiers speak full gitignore syntax, including
//! `!` negation; the first tier to give a definitive answer wins, so a
//! library-level `!keep.me` re-includes a file the project tier dropped.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use tracing::debug;

/// File name of the optional project-global ignore file, relative to the
/// project root.
pub const GLOBAL_IGNORE_FILE: &str = ".ams-compose-ignore";

/// Names excluded from every extraction, matched on any path component.
/// The same set is excluded from tree checksums, which is what keeps install
/// and validate in agreement about files the tool itself writes (such as the
/// `checkin: false` per-library `.gitignore`).
pub const BUILTIN_IGNORES: &[&str] = &[
    ".git",
    ".gitignore",
    ".gitmodules",
    ".svn",
    ".hg",
    "CVS",
    "__pycache__",
    ".ipynb_checkpoints",
    ".vscode",
    ".idea",
    "node_modules",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
];

/// Basename prefixes that are force-preserved when a library is checked in.
const PRESERVED_PREFIXES: &[&str] = &["LICENSE", "COPYING", "NOTICE"];

#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        err: ignore::Error,
    },
    #[error("failed to load `{}`", path.display())]
    GlobalFile {
        path: PathBuf,
        #[source]
        err: ignore::Error,
    },
}

/// Whether `name` is in the built-in excluded set.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_IGNORES.iter().any(|builtin| *builtin == name)
}

/// Whether a file with basename `name` is force-preserved under
/// `checkin: true` (license-like files are kept for attribution).
pub fn is_preserved_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    PRESERVED_PREFIXES
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

/// The assembled three-tier filter for one library's extraction.
#[derive(Debug)]
pub struct IgnoreFilter {
    /// Tier of per-library manifest patterns.
    library: Option<Gitignore>,
    /// Tier of project-global patterns.
    project: Option<Gitignore>,
    /// Force-preserve license-like files (enabled iff `checkin`).
    preserve_licenses: bool,
}

impl IgnoreFilter {
    /// Build the filter for one library.
    ///
    /// `project_root` is consulted for [`GLOBAL_IGNORE_FILE`]; `patterns` are
    /// the manifest's per-library lines; `preserve_licenses` mirrors the
    /// library's `checkin` flag.
    pub fn new(
        project_root: &Path,
        patterns: &[String],
        preserve_licenses: bool,
    ) -> Result<Self, IgnoreError> {
        let library = if patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new("");
            for pattern in patterns {
                builder
                    .add_line(None, pattern)
                    .map_err(|err| IgnoreError::Pattern {
                        pattern: pattern.clone(),
                        err,
                    })?;
            }
            Some(builder.build().map_err(|err| IgnoreError::Pattern {
                pattern: patterns.join(", "),
                err,
            })?)
        };

        let global_file = project_root.join(GLOBAL_IGNORE_FILE);
        let project = if global_file.is_file() {
            // Rooted at the project so anchored (`/foo`) lines behave.
            let mut builder = GitignoreBuilder::new(project_root);
            if let Some(err) = builder.add(&global_file) {
                return Err(IgnoreError::GlobalFile {
                    path: global_file,
                    err,
                });
            }
            let gitignore = builder.build().map_err(|err| IgnoreError::GlobalFile {
                path: global_file.clone(),
                err,
            })?;
            debug!(
                "loaded {} project ignore patterns from `{}`",
                gitignore.num_ignores() + gitignore.num_whitelists(),
                global_file.display()
            );
            Some(gitignore)
        } else {
            None
        };

        Ok(Self {
            library,
            project,
            preserve_licenses,
        })
    }

    /// Whether the path (relative to the extraction source) is excluded.
    ///
    /// Excluded directories prune their whole subtree; like git itself, a
    /// negation cannot re-include a file whose parent directory was dropped.
    pub fn excludes(&self, relative: &Path, is_dir: bool) -> bool {
        if self.preserve_licenses && !is_dir {
            if let Some(name) = relative.file_name().and_then(|name| name.to_str()) {
                if is_preserved_name(name) {
                    return false;
                }
            }
        }

        for tier in [self.library.as_ref(), self.project.as_ref()].into_iter().flatten() {
            match matched(tier, relative, is_dir) {
                Match::Whitelist(_) => return false,
                Match::Ignore(_) => return true,
                Match::None => {}
            }
        }

        relative
            .components()
            .any(|component| match component.as_os_str().to_str() {
                Some(name) => is_builtin(name),
                None => false,
            })
    }
}

/// Match a candidate against one gitignore tier.
///
/// Gitignore implementations disagree on whether a directory needs the
/// trailing-slash form to match a `dir/` pattern, so directories are tested
/// under both `name` and `name/`; the first definitive answer wins.
fn matched<'a>(gitignore: &'a Gitignore, relative: &Path, is_dir: bool) -> Match<&'a ignore::gitignore::Glob> {
    let direct = gitignore.matched(relative, is_dir);
    if !matches!(direct, Match::None) || !is_dir {
        return direct;
    }
    let mut trailing = relative.as_os_str().to_os_string();
    trailing.push("/");
    gitignore.matched(Path::new(&trailing), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn filter(patterns: &[&str]) -> IgnoreFilter {
        let patterns: Vec<String> = patterns.iter().map(|p| (*p).to_string()).collect();
        IgnoreFilter::new(Path::new("/nonexistent"), &patterns, false).unwrap()
    }

    #[test]
    fn builtins_always_excluded() {
        let filter = filter(&[]);
        assert!(filter.excludes(Path::new(".git"), true));
        assert!(filter.excludes(Path::new("sub/.DS_Store"), false));
        assert!(filter.excludes(Path::new("deep/node_modules"), true));
        assert!(!filter.excludes(Path::new("src/cell.sch"), false));
    }

    #[test]
    fn glob_patterns() {
        let filter = filter(&["*.log", "build/"]);
        assert!(filter.excludes(Path::new("sim.log"), false));
        assert!(filter.excludes(Path::new("sub/sim.log"), false));
        assert!(filter.excludes(Path::new("build"), true));
        assert!(!filter.excludes(Path::new("build.rs"), false));
    }

    #[test]
    fn directory_only_pattern_spares_files() {
        let filter = filter(&["cache/"]);
        assert!(filter.excludes(Path::new("cache"), true));
        assert!(!filter.excludes(Path::new("cache"), false));
    }

    #[test]
    fn negation_reincludes() {
        let filter = filter(&["*.raw", "!keep.raw"]);
        assert!(filter.excludes(Path::new("waves.raw"), false));
        assert!(!filter.excludes(Path::new("keep.raw"), false));
    }

    #[test]
    fn anchored_pattern() {
        let filter = filter(&["/top.gds"]);
        assert!(filter.excludes(Path::new("top.gds"), false));
        assert!(!filter.excludes(Path::new("sub/top.gds"), false));
    }

    #[test]
    fn double_star() {
        let filter = filter(&["**/results/**"]);
        assert!(filter.excludes(Path::new("a/results/x.csv"), false));
        assert!(filter.excludes(Path::new("results/x.csv"), false));
    }

    #[test]
    fn library_tier_overrides_project_tier() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            &dir.path().join(GLOBAL_IGNORE_FILE),
            indoc! {"
                # project-wide noise
                *.bak
                testbench/
            "},
        );
        let patterns = vec![String::from("!golden.bak")];
        let filter = IgnoreFilter::new(dir.path(), &patterns, false).unwrap();

        assert!(filter.excludes(Path::new("old.bak"), false));
        assert!(!filter.excludes(Path::new("golden.bak"), false));
        assert!(filter.excludes(Path::new("testbench"), true));
    }

    #[test]
    fn preserved_names_bypass_patterns() {
        let patterns = vec![String::from("*")];
        let filter = IgnoreFilter::new(Path::new("/nonexistent"), &patterns, true).unwrap();
        assert!(!filter.excludes(Path::new("LICENSE"), false));
        assert!(!filter.excludes(Path::new("sub/COPYING"), false));
        assert!(!filter.excludes(Path::new("NOTICE.txt"), false));
        assert!(filter.excludes(Path::new("readme.md"), false));
    }

    #[test]
    fn preserve_disabled_without_checkin() {
        let patterns = vec![String::from("LICENSE*")];
        let filter = IgnoreFilter::new(Path::new("/nonexistent"), &patterns, false).unwrap();
        assert!(filter.excludes(Path::new("LICENSE"), false));
    }

    fn write_file(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }
}
