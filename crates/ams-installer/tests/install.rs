//! End-to-end install/update runs against local fixture repositories,
//! reached over `file://` URLs under the test-mode gate.

use std::path::{Path, PathBuf};
use std::process::Command;

use ams_installer::{install, InstallOptions};
use ams_lock::{InstallStatus, LockFile, PROVENANCE_FILE};

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=fixture",
            "-c",
            "user.email=fixture@example.com",
        ])
        .args(args)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

/// Build an upstream repository with a `LICENSE` at the root, a tagged
/// release, and a `src/widget` subtree.
fn fixture_repo(root: &Path) -> String {
    fs_err::create_dir_all(root).unwrap();
    git(root, &["init", "-q", "-b", "main"]);
    fs_err::write(
        root.join("LICENSE"),
        "MIT License\n\nCopyright (c) 2026 Fixture\n",
    )
    .unwrap();
    fs_err::create_dir_all(root.join("src/widget")).unwrap();
    fs_err::write(root.join("src/widget/cell.sch"), "v {xschem}\n").unwrap();
    fs_err::write(root.join("src/widget/cell.sym"), "v {xschem}\n").unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-q", "-m", "initial"]);
    git(root, &["tag", "v1.0.0"]);
    format!("file://{}", root.display())
}

fn write_manifest(project: &Path, repo: &str, reference: &str, extra: &str) {
    fs_err::create_dir_all(project).unwrap();
    fs_err::write(
        project.join("ams-compose.yaml"),
        format!(
            "library_root: libs\nimports:\n  widget:\n    repo: {repo}\n    ref: {reference}\n    source_path: src/widget\n{extra}"
        ),
    )
    .unwrap();
}

async fn run(project: &Path, options: InstallOptions) -> ams_installer::InstallReport {
    temp_env::async_with_vars(
        [("AMS_COMPOSE_TEST_MODE", Some("1"))],
        install(project, &options),
    )
    .await
    .expect("run-fatal install error")
}

struct World {
    _tmp: tempfile::TempDir,
    project: PathBuf,
    upstream: PathBuf,
    repo_url: String,
}

fn world() -> World {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    let repo_url = fixture_repo(&upstream);
    let project = tmp.path().join("project");
    fs_err::create_dir_all(&project).unwrap();
    World {
        _tmp: tmp,
        project,
        upstream,
        repo_url,
    }
}

#[tokio::test]
async fn fresh_install_materializes_the_library() {
    let w = world();
    write_manifest(&w.project, &w.repo_url, "v1.0.0", "");

    let report = run(&w.project, InstallOptions::default()).await;
    assert!(!report.any_errors());
    assert_eq!(report.results[0].status, InstallStatus::Installed);

    let dest = w.project.join("libs/widget");
    assert!(dest.join("cell.sch").exists());
    assert!(!dest.join(".git").exists());
    // Repo-root license travels into the subtree extraction.
    assert!(dest.join("LICENSE").exists());
    assert!(dest.join(PROVENANCE_FILE).exists());

    let digest = ams_cache_key::repo_url_digest(&w.repo_url).unwrap();
    assert!(w.project.join(".mirror").join(digest).join(".git").exists());

    let lock = LockFile::load(&w.project).unwrap();
    let entry = lock.get("widget").unwrap();
    assert_eq!(entry.commit.len(), 40);
    assert!(entry.commit.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(entry.checksum.len(), 64);
    assert_eq!(entry.local_path, "libs/widget");
    assert_eq!(entry.license.as_deref(), Some("MIT"));
    assert_eq!(entry.install_status, Some(InstallStatus::Installed));
}

#[tokio::test]
async fn reinstall_is_idempotent() {
    let w = world();
    write_manifest(&w.project, &w.repo_url, "v1.0.0", "");

    run(&w.project, InstallOptions::default()).await;
    let first = LockFile::load(&w.project).unwrap();

    let report = run(&w.project, InstallOptions::default()).await;
    assert_eq!(report.results[0].status, InstallStatus::UpToDate);

    let second = LockFile::load(&w.project).unwrap();
    let (a, b) = (first.get("widget").unwrap(), second.get("widget").unwrap());
    assert_eq!(a.commit, b.commit);
    assert_eq!(a.checksum, b.checksum);
    assert_eq!(a.installed_at, b.installed_at);
    assert_eq!(a.updated_at, b.updated_at);

    // The tree itself is bit-identical.
    let digest =
        ams_cache_key::tree_digest(w.project.join("libs/widget"), &ams_extract::checksum_excludes)
            .unwrap();
    assert_eq!(digest, b.checksum);
}

#[tokio::test]
async fn branch_update_with_remote_probe() {
    let w = world();
    write_manifest(&w.project, &w.repo_url, "main", "");

    run(&w.project, InstallOptions::default()).await;
    let before = LockFile::load(&w.project).unwrap();

    // Upstream advances `main`.
    fs_err::write(w.upstream.join("src/widget/cell.sch"), "v {xschem} rev2\n").unwrap();
    git(&w.upstream, &["add", "."]);
    git(&w.upstream, &["commit", "-q", "-m", "rev2"]);

    // Plain install stays offline and reports up-to-date.
    let offline = run(&w.project, InstallOptions::default()).await;
    assert_eq!(offline.results[0].status, InstallStatus::UpToDate);

    // Update probes the remote and picks up the new commit.
    let report = run(
        &w.project,
        InstallOptions {
            remote_probe: true,
            ..InstallOptions::default()
        },
    )
    .await;
    assert_eq!(report.results[0].status, InstallStatus::Updated);

    let after = LockFile::load(&w.project).unwrap();
    let (old, new) = (before.get("widget").unwrap(), after.get("widget").unwrap());
    assert_ne!(old.commit, new.commit);
    assert_ne!(old.checksum, new.checksum);
    assert_eq!(old.installed_at, new.installed_at);
    assert!(new.updated_at >= old.updated_at);

    let updated = fs_err::read_to_string(w.project.join("libs/widget/cell.sch")).unwrap();
    assert!(updated.contains("rev2"));
}

#[tokio::test]
async fn per_library_errors_do_not_abort_the_run() {
    let w = world();
    fs_err::write(
        w.project.join("ams-compose.yaml"),
        format!(
            "library_root: libs\nimports:\n  escape:\n    repo: {repo}\n    ref: v1.0.0\n    source_path: src/widget\n    local_path: ../../etc\n  widget:\n    repo: {repo}\n    ref: v1.0.0\n    source_path: src/widget\n",
            repo = w.repo_url
        ),
    )
    .unwrap();

    let report = run(&w.project, InstallOptions::default()).await;
    assert!(report.any_errors());
    assert_eq!(report.results[0].status, InstallStatus::Error);
    assert_eq!(report.results[1].status, InstallStatus::Installed);

    // The failing library wrote nothing; the healthy one is locked.
    let lock = LockFile::load(&w.project).unwrap();
    assert!(lock.get("escape").is_none());
    assert!(lock.get("widget").is_some());
}

#[tokio::test]
async fn pinned_commit_install_is_offline_stable() {
    let w = world();
    write_manifest(&w.project, &w.repo_url, "v1.0.0", "");
    run(&w.project, InstallOptions::default()).await;
    let pinned = LockFile::load(&w.project).unwrap().libraries["widget"]
        .commit
        .clone();

    // Re-pin to the commit SHA itself; still up to date, no reinstall.
    write_manifest(&w.project, &w.repo_url, &pinned, "");
    let report = run(&w.project, InstallOptions::default()).await;
    assert_eq!(report.results[0].status, InstallStatus::Updated);

    let lock = LockFile::load(&w.project).unwrap();
    assert_eq!(lock.libraries["widget"].commit, pinned);
}

#[tokio::test]
async fn targeted_install_skips_other_libraries() {
    let w = world();
    fs_err::write(
        w.project.join("ams-compose.yaml"),
        format!(
            "library_root: libs\nimports:\n  widget:\n    repo: {repo}\n    ref: v1.0.0\n    source_path: src/widget\n  docs:\n    repo: {repo}\n    ref: v1.0.0\n    source_path: .\n",
            repo = w.repo_url
        ),
    )
    .unwrap();

    let report = run(
        &w.project,
        InstallOptions {
            targets: Some(std::collections::BTreeSet::from(["widget".to_owned()])),
            ..InstallOptions::default()
        },
    )
    .await;
    assert_eq!(report.results[0].status, InstallStatus::Installed);
    assert_eq!(report.results[1].status, InstallStatus::Skipped);
    assert!(!w.project.join("libs/docs").exists());
}
