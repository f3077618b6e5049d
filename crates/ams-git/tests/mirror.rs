//! Mirror cache behavior against local fixture repositories.

use std::path::{Path, PathBuf};
use std::process::Command;

use ams_git::{GitError, MirrorCache};

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=fixture",
            "-c",
            "user.email=fixture@example.com",
        ])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

fn fixture_repo(root: &Path) -> String {
    fs_err::create_dir_all(root).unwrap();
    git(root, &["init", "-q", "-b", "main"]);
    fs_err::write(root.join("top.sch"), "v {xschem}\n").unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-q", "-m", "initial"]);
    git(root, &["tag", "v1.0.0"]);
    format!("file://{}", root.display())
}

struct World {
    _tmp: tempfile::TempDir,
    project: PathBuf,
    upstream: PathBuf,
    url: String,
}

fn world() -> World {
    let tmp = tempfile::tempdir().unwrap();
    let upstream = tmp.path().join("upstream");
    let url = fixture_repo(&upstream);
    let project = tmp.path().join("project");
    fs_err::create_dir_all(&project).unwrap();
    World {
        _tmp: tmp,
        project,
        upstream,
        url,
    }
}

fn advance_upstream(world: &World) -> String {
    fs_err::write(world.upstream.join("top.sch"), "v {xschem} rev2\n").unwrap();
    git(&world.upstream, &["add", "."]);
    git(&world.upstream, &["commit", "-q", "-m", "rev2"]);
    git(&world.upstream, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn first_ensure_builds_the_mirror() {
    let w = world();
    let cache = MirrorCache::new(&w.project);

    let checkout = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();
    assert_eq!(checkout.commit.len(), 40);
    assert!(checkout.mirror.join(".git").exists());
    assert!(checkout.mirror.join("top.sch").exists());
    assert!(checkout.mirror.starts_with(w.project.join(".mirror")));

    // No half-built staging directory remains.
    let strays: Vec<_> = fs_err::read_dir(w.project.join(".mirror"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".building-"))
        .collect();
    assert!(strays.is_empty());
}

#[tokio::test]
async fn mirrors_are_shared_across_url_spellings() {
    let w = world();
    let cache = MirrorCache::new(&w.project);

    let first = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();
    let second = cache
        .ensure(&format!("{}/", w.url), "v1.0.0", false)
        .await
        .unwrap();
    assert_eq!(first.mirror, second.mirror);
}

#[tokio::test]
async fn tag_install_skips_the_network_once_local() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let first = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();

    // Nuke the upstream; a cached tag must still resolve offline.
    ams_fs::rm_rf(&w.upstream).unwrap();
    let second = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();
    assert_eq!(first.commit, second.commit);
}

#[tokio::test]
async fn branch_probe_follows_upstream() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let stale = cache.ensure(&w.url, "main", false).await.unwrap();

    let new_tip = advance_upstream(&w);

    // Without a probe the branch stays where the mirror has it.
    let unprobed = cache.ensure(&w.url, "main", false).await.unwrap();
    assert_eq!(unprobed.commit, stale.commit);

    // A probe fetches and lands on the new tip.
    let probed = cache.ensure(&w.url, "main", true).await.unwrap();
    assert_eq!(probed.commit, new_tip);
    let contents = fs_err::read_to_string(probed.mirror.join("top.sch")).unwrap();
    assert!(contents.contains("rev2"));
}

#[tokio::test]
async fn resolve_commit_probes_without_touching_the_tree() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let checkout = cache.ensure(&w.url, "main", false).await.unwrap();

    let new_tip = advance_upstream(&w);
    let resolved = cache.resolve_commit(&w.url, "main", true).await.unwrap();
    assert_eq!(resolved, new_tip);

    // The working tree still shows the old checkout.
    let contents = fs_err::read_to_string(checkout.mirror.join("top.sch")).unwrap();
    assert!(!contents.contains("rev2"));
}

#[tokio::test]
async fn commit_refs_resolve_full_and_abbreviated() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let tip = cache.ensure(&w.url, "main", false).await.unwrap();

    let full = cache.ensure(&w.url, &tip.commit, false).await.unwrap();
    assert_eq!(full.commit, tip.commit);

    let abbrev = cache
        .ensure(&w.url, &tip.commit[..10], false)
        .await
        .unwrap();
    assert_eq!(abbrev.commit, tip.commit);
}

#[tokio::test]
async fn tags_win_over_branches_with_the_same_name() {
    let w = world();
    let tagged = git(&w.upstream, &["rev-parse", "HEAD"]);
    // Create a branch named like the tag, pointing at a newer commit.
    advance_upstream(&w);
    git(&w.upstream, &["branch", "v1.0.0", "HEAD"]);

    let cache = MirrorCache::new(&w.project);
    let checkout = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();
    assert_eq!(checkout.commit, tagged);
}

#[tokio::test]
async fn unknown_ref_is_ref_not_found() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let err = cache.ensure(&w.url, "does-not-exist", false).await.unwrap_err();
    assert!(matches!(err, GitError::RefNotFound { .. }), "{err}");
}

#[tokio::test]
async fn corrupt_mirror_is_rebuilt() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let checkout = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();

    // Replace the mirror with junk; the next ensure must recover.
    ams_fs::rm_rf(&checkout.mirror).unwrap();
    fs_err::create_dir_all(&checkout.mirror).unwrap();
    fs_err::write(checkout.mirror.join("garbage"), "not a repo").unwrap();

    let recovered = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();
    assert_eq!(recovered.commit, checkout.commit);
    assert!(recovered.mirror.join(".git").exists());
}

#[tokio::test]
async fn dirty_working_tree_is_reset() {
    let w = world();
    let cache = MirrorCache::new(&w.project);
    let checkout = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();

    fs_err::write(checkout.mirror.join("top.sch"), "local damage\n").unwrap();
    let repaired = cache.ensure(&w.url, "v1.0.0", false).await.unwrap();
    let contents = fs_err::read_to_string(repaired.mirror.join("top.sch")).unwrap();
    assert!(!contents.contains("damage"));
}
