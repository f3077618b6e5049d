//! Reference classification and resolution.
//!
//! A manifest `ref` can be a branch name, a tag name, or a (possibly
//! abbreviated) commit SHA, and the three fetch very differently: commits are
//! immutable, local tags pin a commit until a probe refreshes them, and
//! branches move under your feet. Classification is performed against the
//! local mirror so it never costs network I/O.

use tracing::trace;

use crate::command::{Git, GitError};

/// What kind of thing a manifest `ref` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A full or abbreviated (>= 7 hex) commit SHA.
    Commit,
    /// A tag that exists in the local mirror.
    Tag,
    /// Anything else; treated as a branch head.
    Branch,
}

impl RefKind {
    pub(crate) async fn classify(git: &Git, reference: &str) -> Self {
        if looks_like_sha(reference) {
            return Self::Commit;
        }
        if has_local_tag(git, reference).await {
            return Self::Tag;
        }
        Self::Branch
    }
}

/// Resolve a reference to a full commit SHA.
///
/// Tags are preferred over branches when a name is ambiguous: tags are
/// immutable, which matches the intent of pinning a manifest to a name.
pub(crate) async fn resolve(
    git: &Git,
    reference: &str,
    kind: RefKind,
) -> Result<String, GitError> {
    let candidates: Vec<String> = match kind {
        RefKind::Commit => vec![format!("{reference}^{{commit}}")],
        RefKind::Tag | RefKind::Branch => vec![
            format!("refs/tags/{reference}^{{commit}}"),
            format!("refs/remotes/origin/{reference}^{{commit}}"),
            format!("{reference}^{{commit}}"),
        ],
    };

    for candidate in &candidates {
        match git
            .output(["rev-parse", "--verify", "--quiet", candidate.as_str()], "rev-parse")
            .await
        {
            Ok(sha) if !sha.is_empty() => {
                trace!("resolved `{reference}` via `{candidate}` to {sha}");
                return Ok(sha);
            }
            Ok(_) => {}
            Err(err @ GitError::Timeout { .. }) => return Err(err),
            Err(_) => {}
        }
    }

    Err(GitError::RefNotFound {
        reference: reference.to_owned(),
    })
}

/// Whether the (commit-like) reference is present in the object store.
pub(crate) async fn has_commit(git: &Git, reference: &str) -> bool {
    let spec = format!("{reference}^{{commit}}");
    git.check(["cat-file", "-e", spec.as_str()], "cat-file")
        .await
        .unwrap_or(false)
}

/// Whether the reference resolves locally at all (any candidate form).
pub(crate) async fn resolvable(git: &Git, reference: &str) -> bool {
    let kind = RefKind::classify(git, reference).await;
    resolve(git, reference, kind).await.is_ok()
}

async fn has_local_tag(git: &Git, reference: &str) -> bool {
    let spec = format!("refs/tags/{reference}");
    git.check(["show-ref", "--verify", "--quiet", spec.as_str()], "show-ref")
        .await
        .unwrap_or(false)
}

/// A 7..=40 character hex string is taken for a commit SHA.
fn looks_like_sha(reference: &str) -> bool {
    (7..=40).contains(&reference.len())
        && reference.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha_detection() {
        assert!(looks_like_sha("0123abc"));
        assert!(looks_like_sha(&"a".repeat(40)));
        assert!(!looks_like_sha("0123ab"));
        assert!(!looks_like_sha(&"a".repeat(41)));
        assert!(!looks_like_sha("v1.2.0"));
        assert!(!looks_like_sha("main"));
        // All-decimal names of plausible length still look like SHAs; git
        // itself has the same ambiguity and resolves objects first.
        assert!(looks_like_sha("1234567"));
    }
}
