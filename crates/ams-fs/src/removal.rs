//! Derived from Cargo's `clean` implementation.
//! Cargo is dual-licensed under either Apache 2.0 or MIT, at the user's choice.
//! Source: <https://github.com/rust-lang/cargo/blob/e1ebce1035f9b53bb46a55bd4b0ecf51e24c6458/src/cargo/ops/cargo_clean.rs#L324>

use std::io;
use std::path::Path;

use fs_err as fs;

/// Remove a file or directory and all its contents, returning a [`Removal`]
/// tally of what was deleted. Missing paths are not an error.
pub fn rm_rf(path: impl AsRef<Path>) -> io::Result<Removal> {
    let mut removal = Removal::default();
    removal.rm_rf(path.as_ref())?;
    Ok(removal)
}

/// A tally of removed filesystem entries, reported by `clean`.
#[derive(Debug, Default)]
pub struct Removal {
    /// The number of files removed.
    pub num_files: u64,
    /// The number of directories removed.
    pub num_dirs: u64,
}

impl Removal {
    fn rm_rf(&mut self, path: &Path) -> io::Result<()> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        if !metadata.is_dir() {
            self.num_files += 1;
            return remove_file(path);
        }

        for entry in walkdir::WalkDir::new(path).contents_first(true) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_dir() {
                self.num_dirs += 1;
                // The contents were removed by the contents-first walk, but
                // fall back to `remove_dir_all` in case the OS added files
                // behind our back.
                fs::remove_dir_all(entry.path())?;
            } else {
                self.num_files += 1;
                remove_file(entry.path())?;
            }
        }

        Ok(())
    }
}

/// Like [`fs_err::remove_file`], but clears a readonly bit before retrying.
/// Git object files are written readonly, and mirrors are full of them.
fn remove_file(path: &Path) -> io::Result<()> {
    fn set_writable(path: &Path) -> io::Result<bool> {
        let mut perms = path.metadata()?.permissions();
        if !perms.readonly() {
            return Ok(false);
        }
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
        Ok(true)
    }

    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err)
            if err.kind() == io::ErrorKind::PermissionDenied
                && set_writable(path).unwrap_or(false) =>
        {
            fs::remove_file(path)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("victim");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/file1"), b"x").unwrap();
        fs::write(root.join("a/b/file2"), b"y").unwrap();

        let removal = rm_rf(&root).unwrap();
        assert!(!root.exists());
        assert_eq!(removal.num_files, 2);
        assert_eq!(removal.num_dirs, 3);
    }

    #[test]
    fn missing_path_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let removal = rm_rf(dir.path().join("absent")).unwrap();
        assert_eq!(removal.num_files, 0);
    }

    #[cfg(unix)]
    #[test]
    fn removes_readonly_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("objects");
        fs::create_dir_all(&root).unwrap();
        let file = root.join("pack");
        fs::write(&file, b"z").unwrap();
        fs::set_permissions(&file, std::fs::Permissions::from_mode(0o444)).unwrap();

        rm_rf(&root).unwrap();
        assert!(!root.exists());
    }
}
