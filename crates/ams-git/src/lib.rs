//! The mirror cache: one full git working copy per upstream repository,
//! addressed by a stable digest of the canonicalized URL and shared by every
//! library that imports from that repository.
//!
//! All remote interaction goes through the ambient `git` binary; every
//! subprocess is bounded by a timeout and killed when it expires. Mirrors are
//! built in a temporary directory and renamed into place, so a half-built
//! mirror is never observable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

pub use command::GitError;
pub use reference::RefKind;

use command::Git;

mod command;
mod reference;

/// Directory under the project root that holds the mirrors.
pub const MIRROR_DIR: &str = ".mirror";

/// Name of the advisory lock file inside [`MIRROR_DIR`].
pub const MIRROR_LOCK: &str = ".lock";

/// Default bound on `git clone`.
const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on every other git operation.
const OPS_TIMEOUT: Duration = Duration::from_secs(60);

/// A mirror checked out at a known commit.
#[derive(Debug, Clone)]
pub struct Checkout {
    /// The mirror's working copy.
    pub mirror: PathBuf,
    /// Full 40-hex commit SHA of `HEAD`.
    pub commit: String,
}

/// The content-addressed mirror cache under `{project_root}/.mirror`.
#[derive(Debug)]
pub struct MirrorCache {
    root: PathBuf,
    clone_timeout: Duration,
    ops_timeout: Duration,
}

impl MirrorCache {
    pub fn new(project_root: &Path) -> Self {
        Self {
            root: project_root.join(MIRROR_DIR),
            clone_timeout: CLONE_TIMEOUT,
            ops_timeout: OPS_TIMEOUT,
        }
    }

    /// Override the default timeouts (used by tests and power users).
    #[must_use]
    pub fn with_timeouts(mut self, clone: Duration, ops: Duration) -> Self {
        self.clone_timeout = clone;
        self.ops_timeout = ops;
        self
    }

    /// The cache root (`{project_root}/.mirror`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open the advisory lock guarding this cache against concurrent
    /// invocations of the tool.
    pub fn lock(&self) -> std::io::Result<fd_lock::RwLock<std::fs::File>> {
        ams_fs::lock_file(self.root.join(MIRROR_LOCK))
    }

    /// The mirror directory for a repository URL.
    pub fn mirror_path(&self, repo: &str) -> Result<PathBuf, GitError> {
        let digest = ams_cache_key::repo_url_digest(repo)
            .map_err(|err| GitError::InvalidUrl {
                url: repo.to_owned(),
                err,
            })?;
        Ok(self.root.join(digest))
    }

    /// Produce a mirror whose working tree is checked out at the commit that
    /// `reference` resolves to, and report that commit.
    ///
    /// `remote_probe` controls whether mutable refs (branches, and tags that
    /// already exist locally) consult the remote; without it, anything
    /// resolvable locally is served without network I/O.
    pub async fn ensure(
        &self,
        repo: &str,
        reference: &str,
        remote_probe: bool,
    ) -> Result<Checkout, GitError> {
        let mirror = self.prepare(repo, reference, remote_probe).await?;
        let commit = self.checkout(&mirror, reference).await?;
        Ok(Checkout { mirror, commit })
    }

    /// Resolve `reference` to a commit SHA without touching any working tree.
    ///
    /// This is the planner's remote probe; it shares all fetch logic with
    /// [`MirrorCache::ensure`] so its network activity is attributable here.
    pub async fn resolve_commit(
        &self,
        repo: &str,
        reference: &str,
        remote_probe: bool,
    ) -> Result<String, GitError> {
        let mirror = self.prepare(repo, reference, remote_probe).await?;
        let git = self.git(&mirror);
        let kind = RefKind::classify(&git, reference).await;
        reference::resolve(&git, reference, kind).await
    }

    /// Make the mirror for `repo` exist and contain `reference`, fetching or
    /// rebuilding as needed. Returns the mirror path.
    async fn prepare(
        &self,
        repo: &str,
        reference: &str,
        remote_probe: bool,
    ) -> Result<PathBuf, GitError> {
        let mirror = self.mirror_path(repo)?;

        let was_corrupt = mirror.exists() && !mirror.join(".git").exists();
        if was_corrupt {
            // Not a repository; whatever it is, it is not ours anymore.
            warn!("`{}` is not a git repository; rebuilding", mirror.display());
            ams_fs::rm_rf(&mirror)?;
        }

        if !mirror.exists() {
            // A failed rebuild of a corrupt mirror reports corruption; a
            // failed first clone is an ordinary error.
            return match self.create(repo, &mirror, reference).await {
                Ok(()) => Ok(mirror),
                Err(recovery) if was_corrupt => Err(GitError::MirrorCorrupt {
                    repo: repo.to_owned(),
                    err: Box::new(recovery),
                }),
                Err(err) => Err(err),
            };
        }

        match self.update(&mirror, reference, remote_probe).await {
            Ok(()) => Ok(mirror),
            // Timeouts, missing refs, and auth failures are conditions of the
            // remote, not corruption; rebuilding would not help.
            Err(err @ (GitError::Timeout { .. }
            | GitError::RefNotFound { .. }
            | GitError::AuthFailed { .. })) => Err(err),
            Err(err) => {
                warn!(
                    "mirror for `{repo}` failed to update ({err}); rebuilding"
                );
                ams_fs::rm_rf(&mirror)?;
                self.create(repo, &mirror, reference)
                    .await
                    .map_err(|recovery| GitError::MirrorCorrupt {
                        repo: repo.to_owned(),
                        err: Box::new(recovery),
                    })?;
                Ok(mirror)
            }
        }
    }

    /// Clone into a temporary sibling and atomically rename into place.
    async fn create(&self, repo: &str, mirror: &Path, reference: &str) -> Result<(), GitError> {
        fs_err::create_dir_all(&self.root)?;
        let staging = tempfile::Builder::new()
            .prefix(".building-")
            .tempdir_in(&self.root)?;

        debug!("cloning `{repo}`");
        let clone = Git::new(self.clone_timeout);
        let args: Vec<&std::ffi::OsStr> = vec![
            "clone".as_ref(),
            "--recurse-submodules".as_ref(),
            "--".as_ref(),
            repo.as_ref(),
            staging.path().as_os_str(),
        ];
        clone.run(args, "clone").await?;

        let git = self.git(staging.path());
        let kind = RefKind::classify(&git, reference).await;
        if matches!(kind, RefKind::Branch) && !reference::resolvable(&git, reference).await {
            // The default branch checkout does not guarantee every branch has
            // a remote-tracking ref under partial server configurations.
            git.run(["fetch", "--tags", "origin"], "fetch").await?;
        }
        let commit = reference::resolve(&git, reference, kind).await?;
        git.run(
            [
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--detach",
                commit.as_str(),
            ],
            "checkout",
        )
        .await?;
        git.run(
            ["submodule", "update", "--init", "--recursive"],
            "submodule update",
        )
        .await?;

        // Only a fully built mirror ever lands at its final path.
        fs_err::rename(staging.keep(), mirror)?;
        debug!("mirror ready at `{}`", mirror.display());
        Ok(())
    }

    /// Bring an existing mirror up to date for `reference`, fetching only
    /// when the classification rules require it.
    async fn update(
        &self,
        mirror: &Path,
        reference: &str,
        remote_probe: bool,
    ) -> Result<(), GitError> {
        let git = self.git(mirror);
        let kind = RefKind::classify(&git, reference).await;

        let need_fetch = match kind {
            // An immutable commit: fetch only if we do not have it yet.
            RefKind::Commit => !reference::has_commit(&git, reference).await,
            // A local tag pins a commit; refresh only on explicit probe.
            RefKind::Tag => remote_probe,
            // Branches move; fetch on probe, or when unresolvable locally.
            RefKind::Branch => {
                remote_probe || !reference::resolvable(&git, reference).await
            }
        };

        if need_fetch {
            debug!("fetching origin into `{}`", mirror.display());
            git.run(
                [
                    "fetch",
                    "--tags",
                    "--force",
                    "--prune",
                    "origin",
                    "+refs/heads/*:refs/remotes/origin/*",
                ],
                "fetch",
            )
            .await?;
        }

        Ok(())
    }

    /// Detach the working tree at the resolved commit and sync submodules.
    async fn checkout(&self, mirror: &Path, reference: &str) -> Result<String, GitError> {
        let git = self.git(mirror);
        let kind = RefKind::classify(&git, reference).await;
        let commit = reference::resolve(&git, reference, kind).await?;

        git.run(
            [
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--detach",
                commit.as_str(),
            ],
            "checkout",
        )
        .await?;
        // The reset guards against a previously interrupted checkout leaving
        // a dirty tree behind.
        git.run(["reset", "--hard", commit.as_str()], "reset").await?;
        git.run(
            ["submodule", "update", "--init", "--recursive"],
            "submodule update",
        )
        .await?;

        git.output(["rev-parse", "HEAD"], "rev-parse").await
    }

    fn git(&self, cwd: &Path) -> Git {
        Git::new(self.ops_timeout).current_dir(cwd)
    }
}
