use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::canonical_url::CanonicalRepoUrl;
use crate::ChecksumError;

/// The number of hex characters in a mirror directory name.
const REPO_DIGEST_LEN: usize = 16;

/// Compute the short hex digest that addresses a repository's mirror
/// directory.
///
/// The digest is taken over the canonicalized URL, so spellings that name the
/// same upstream (`.git` suffix, trailing slash, scp shorthand) collapse onto
/// the same mirror. The value is stable across runs and platforms.
pub fn repo_url_digest(url: &str) -> Result<String, url::ParseError> {
    let canonical = CanonicalRepoUrl::parse(url)?;
    let digest = Sha256::digest(canonical.as_str().as_bytes());
    Ok(hex::encode(&digest[..REPO_DIGEST_LEN / 2]))
}

/// Compute the SHA-256 hex digest of a file's contents.
pub fn file_digest(path: impl AsRef<Path>) -> Result<String, ChecksumError> {
    let path = path.as_ref();
    let mut hasher = Sha256::new();
    hash_file_into(path, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Stream a file's contents into an existing hasher.
pub(crate) fn hash_file_into(path: &Path, hasher: &mut Sha256) -> Result<(), ChecksumError> {
    let io_err = |err| ChecksumError::Io {
        path: path.to_path_buf(),
        err,
    };
    let mut file = fs_err::File::open(path).map_err(io_err)?;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(())
}
