pub use canonical_url::CanonicalRepoUrl;
pub use digest::{file_digest, repo_url_digest};
pub use tree::{tree_digest, ExcludePredicate};

mod canonical_url;
mod digest;
mod tree;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("failed to hash `{}`", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to walk directory tree")]
    Walk(#[from] walkdir::Error),
}
