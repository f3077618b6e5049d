use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::trace;
use walkdir::WalkDir;

use crate::digest::hash_file_into;
use crate::ChecksumError;

/// Decides whether a path (relative to the digest root) is excluded from a
/// tree digest. Returning `true` for a directory prunes its whole subtree.
pub type ExcludePredicate<'a> = &'a dyn Fn(&Path) -> bool;

/// Compute the content digest of a directory tree.
///
/// Per file: `sha256(rel_path ‖ 0x00 ‖ sha256(contents))`, with the relative
/// path rendered with `/` separators. Entries are sorted by relative path
/// bytes and the final digest is the SHA-256 of the concatenated entry
/// digests. Symlinks are hashed by their target string and never followed;
/// empty directories do not contribute.
///
/// Install and validate both call this with the same exclude predicate, so a
/// tree is `modified` exactly when some included file changed.
pub fn tree_digest(
    root: impl AsRef<Path>,
    exclude: ExcludePredicate<'_>,
) -> Result<String, ChecksumError> {
    let root = root.as_ref();
    let mut entries: Vec<(String, [u8; 32])> = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|entry| {
        entry.path() == root
            || !exclude(entry.path().strip_prefix(root).unwrap_or(entry.path()))
    }) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let relative = portable(relative);

        let content_digest: [u8; 32] = if file_type.is_symlink() {
            let target = fs_err::read_link(entry.path()).map_err(|err| ChecksumError::Io {
                path: entry.path().to_path_buf(),
                err,
            })?;
            Sha256::digest(target.to_string_lossy().as_bytes()).into()
        } else {
            let mut hasher = Sha256::new();
            hash_file_into(entry.path(), &mut hasher)?;
            hasher.finalize().into()
        };

        let mut entry_hasher = Sha256::new();
        entry_hasher.update(relative.as_bytes());
        entry_hasher.update([0u8]);
        entry_hasher.update(content_digest);
        entries.push((relative, entry_hasher.finalize().into()));
    }

    entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
    trace!("hashed {} entries under {}", entries.len(), root.display());

    let mut tree_hasher = Sha256::new();
    for (_, digest) in &entries {
        tree_hasher.update(digest);
    }
    Ok(hex::encode(tree_hasher.finalize()))
}

/// Render a relative path with `/` separators regardless of platform.
fn portable(path: &Path) -> String {
    let mut rendered = String::new();
    for component in path.components() {
        if !rendered.is_empty() {
            rendered.push('/');
        }
        rendered.push_str(&component.as_os_str().to_string_lossy());
    }
    rendered
}
