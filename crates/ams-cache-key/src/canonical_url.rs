use std::fmt::{Display, Formatter};

use url::Url;

/// A "canonical" version of a repository URL, used for cache addressing.
///
/// Canonicalization papers over the spellings under which the same upstream
/// repository can be named: `github.com/foo/bar` vs. `github.com/foo/bar.git`,
/// trailing slashes, uppercase schemes, and the scp-style shorthand
/// `host:owner/name`. Two manifests naming the same repository through any of
/// these spellings share one mirror.
///
/// This is only for internal comparison and addressing; fetching always uses
/// the URL as the user wrote it.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct CanonicalRepoUrl(Url);

impl CanonicalRepoUrl {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let mut url = match Url::parse(raw) {
            Ok(url) => url,
            // `host:owner/name` is accepted by git as ssh shorthand; rewrite
            // it before parsing so it canonicalizes like the long form.
            Err(url::ParseError::RelativeUrlWithoutBase) if is_scp_shorthand(raw) => {
                Url::parse(&format!("ssh://{}", raw.replacen(':', "/", 1)))?
            }
            Err(err) => return Err(err),
        };

        // Comparison only, so fragments and queries never discriminate.
        url.set_fragment(None);
        url.set_query(None);

        // Strip a trailing slash.
        if url.path().ends_with('/') {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty();
            }
        }

        // Repos can generally be accessed with or without the `.git` extension.
        let needs_chopping = std::path::Path::new(url.path())
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("git"));
        if needs_chopping {
            let last = {
                let last = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default();
                last[..last.len() - 4].to_owned()
            };
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop().push(&last);
            }
        }

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for CanonicalRepoUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Returns `true` for `host:owner/name` (optionally `user@host:owner/name`),
/// git's ssh shorthand. A colon before the first slash is the tell.
fn is_scp_shorthand(raw: &str) -> bool {
    let head = raw.split('/').next().unwrap_or(raw);
    head.contains(':') && !head.contains("://")
}
