use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use tracing::{debug, warn};

pub use removal::{rm_rf, Removal};

mod removal;

/// Write `data` to `path` atomically: write to a sibling `.tmp` file, fsync,
/// then rename over the destination. A crash mid-write leaves the previous
/// file intact.
pub fn write_atomic(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> io::Result<()> {
    let path = path.as_ref();
    let tmp = sibling(path, ".tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data.as_ref())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Replace the directory at `dest` with the directory at `staged`, atomically
/// from the reader's point of view.
///
/// An existing `dest` is first renamed to a quarantine sibling, then `staged`
/// is renamed into place, then the quarantine is removed. If a rename fails,
/// `staged` is cleaned up and the original is left in place.
pub fn replace_dir(staged: &Path, dest: &Path) -> io::Result<()> {
    let quarantine = sibling(dest, ".old");
    if quarantine.symlink_metadata().is_ok() {
        rm_rf(&quarantine)?;
    }

    let had_previous = dest.symlink_metadata().is_ok();
    if had_previous {
        if let Err(err) = fs::rename(dest, &quarantine) {
            rm_rf(staged).ok();
            return Err(err);
        }
    }

    if let Err(err) = fs::rename(staged, dest) {
        // Roll the previous tree back into place before surfacing the error.
        if had_previous {
            if let Err(restore) = fs::rename(&quarantine, dest) {
                warn!("failed to restore `{}`: {restore}", dest.display());
            }
        }
        rm_rf(staged).ok();
        return Err(err);
    }

    if had_previous {
        let removal = rm_rf(&quarantine)?;
        debug!(
            "replaced `{}` ({} stale files removed)",
            dest.display(),
            removal.num_files
        );
    }
    Ok(())
}

/// Open (creating if needed) the advisory lock file at `path`.
///
/// The caller holds the exclusive guard for as long as the guarded resource
/// is in use:
///
/// ```no_run
/// let mut lock = ams_fs::lock_file(".mirror/.lock")?;
/// let _guard = lock.write()?;
/// // ... mutate the mirror cache ...
/// # Ok::<(), std::io::Error>(())
/// ```
///
/// Within one process operations are already serialized; the lock guards
/// against concurrent invocations of the tool.
pub fn lock_file(path: impl AsRef<Path>) -> io::Result<fd_lock::RwLock<std::fs::File>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)?;
    Ok(fd_lock::RwLock::new(file))
}

/// A staging directory created next to its final destination, so the final
/// rename never crosses a filesystem boundary. Removed on drop unless
/// [`StagedDir::keep`] was called.
#[derive(Debug)]
pub struct StagedDir {
    path: PathBuf,
    keep: bool,
}

impl StagedDir {
    pub fn for_dest(dest: &Path) -> io::Result<Self> {
        let parent = dest.parent().ok_or_else(|| {
            io::Error::other(format!("`{}` has no parent directory", dest.display()))
        })?;
        fs::create_dir_all(parent)?;
        let name = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("staged"));
        let path = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .tempdir_in(parent)?
            .keep();
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the handle without removing the directory; used after the
    /// directory was renamed into its final place.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.keep && self.path.symlink_metadata().is_ok() {
            if let Err(err) = rm_rf(&self.path) {
                warn!("failed to remove `{}`: {err}", self.path.display());
            }
        }
    }
}

/// A sibling path with a suffix appended to the file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockfile");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!sibling(&path, ".tmp").exists());
    }

    #[test]
    fn replace_dir_swaps_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lib");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.txt"), b"old").unwrap();

        let staged = StagedDir::for_dest(&dest).unwrap();
        fs::write(staged.path().join("new.txt"), b"new").unwrap();
        let staged = staged.keep();
        replace_dir(&staged, &dest).unwrap();

        assert!(dest.join("new.txt").exists());
        assert!(!dest.join("old.txt").exists());
        assert!(!sibling(&dest, ".old").exists());
    }

    #[test]
    fn replace_dir_without_previous() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lib");

        let staged = StagedDir::for_dest(&dest).unwrap();
        fs::write(staged.path().join("new.txt"), b"new").unwrap();
        let staged = staged.keep();
        replace_dir(&staged, &dest).unwrap();

        assert!(dest.join("new.txt").exists());
    }

    #[test]
    fn staged_dir_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lib");
        let path = {
            let staged = StagedDir::for_dest(&dest).unwrap();
            fs::write(staged.path().join("file"), b"x").unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn lock_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mirror/.lock");
        let mut lock = lock_file(&path).unwrap();
        let _guard = lock.write().unwrap();
        assert!(path.exists());
    }
}
