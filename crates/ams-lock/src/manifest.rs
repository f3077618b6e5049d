use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name of the manifest, relative to the project root.
pub const MANIFEST_FILE: &str = "ams-compose.yaml";

/// Default parent directory for installed libraries.
pub const DEFAULT_LIBRARY_ROOT: &str = "designs/libs";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no `{MANIFEST_FILE}` found in `{}`", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to parse `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
    #[error("failed to read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// The user-authored import manifest.
///
/// Parsing is strict: unknown keys at either level are rejected so a typo in
/// a field name fails loudly instead of silently changing behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Default parent directory for installed libraries, relative to the
    /// project root.
    #[serde(default = "default_library_root")]
    pub library_root: String,
    /// Libraries to import, keyed by name; processed in declaration order.
    #[serde(default)]
    pub imports: IndexMap<String, ImportSpec>,
}

/// One library import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ImportSpec {
    /// Repository URL (`https`, `ssh`, `git`, `git+https`, `git+ssh`, or the
    /// `host:owner/name` shorthand).
    pub repo: String,
    /// Branch name, tag name, or (optionally abbreviated) commit SHA.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Path inside the repository to extract; `.` means the whole tree.
    pub source_path: String,
    /// Destination override, relative to the project root. Defaults to
    /// `{library_root}/{name}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Whether the library is intended for check-in to the consumer VCS.
    #[serde(default = "default_true")]
    pub checkin: bool,
    /// Extra gitignore-style patterns layered over the built-in and
    /// project-global tiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_patterns: Vec<String>,
    /// User-asserted license identifier; overrides detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            library_root: DEFAULT_LIBRARY_ROOT.to_owned(),
            imports: IndexMap::new(),
        }
    }
}

impl Manifest {
    /// Load and strictly parse `{project_root}/ams-compose.yaml`.
    pub fn load(project_root: &Path) -> Result<Self, ManifestError> {
        let path = project_root.join(MANIFEST_FILE);
        let contents = match fs_err::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound {
                    path: project_root.to_path_buf(),
                });
            }
            Err(err) => return Err(ManifestError::Io { path, err }),
        };
        let manifest: Self =
            serde_yaml::from_str(&contents).map_err(|err| ManifestError::Parse { path, err })?;
        debug!("loaded manifest with {} imports", manifest.imports.len());
        Ok(manifest)
    }

    /// The commented scaffold written by `ams-compose init`.
    pub fn template() -> &'static str {
        r#"# ams-compose manifest. Declare the libraries this project imports.
#
# Run `ams-compose install` after editing.

library_root: designs/libs

imports: {}
  # widget:
  #   repo: https://github.com/example/widgets.git
  #   ref: v1.2.0
  #   source_path: src/widget
  #   # local_path: ip/widget
  #   # checkin: false
  #   # ignore_patterns: ["*.log", "results/"]
  #   # license: Apache-2.0
"#
    }
}

fn default_library_root() -> String {
    DEFAULT_LIBRARY_ROOT.to_owned()
}

fn default_true() -> bool {
    true
}
