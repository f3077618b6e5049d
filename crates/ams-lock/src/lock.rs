use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name of the lock file, relative to the project root.
pub const LOCK_FILE: &str = ".ams-compose.lock";

/// The lock schema this build reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to parse `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
    #[error(
        "`{}` has schema version {found}, but this build supports at most {SCHEMA_VERSION}; \
         upgrade ams-compose",
        path.display()
    )]
    SchemaTooNew { path: PathBuf, found: u32 },
    #[error("failed to access `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Outcome of the last install/update run for one library. Ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Installed,
    Updated,
    UpToDate,
    Error,
    Skipped,
}

/// Verdict of the last validation run for one library. Ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Modified,
    Missing,
    Orphaned,
    Error,
    NotInstalled,
}

/// Persisted record of one installed library's resolved state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Snapshot of the `ImportSpec` actually applied.
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub source_path: String,
    /// Destination, relative to the project root, as resolved at install.
    pub local_path: String,
    pub checkin: bool,
    /// Full commit SHA the extraction was taken from.
    pub commit: String,
    /// Tree digest of the extracted library.
    pub checksum: String,
    pub installed_at: Timestamp,
    pub updated_at: Timestamp,
    pub license: Option<String>,
    pub license_file: Option<String>,

    // Per-run result fields; never required to survive across runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_status: Option<InstallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_change: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_warning: Option<String>,
}

/// The lock file: resolved state for every installed library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockFile {
    pub schema_version: u32,
    #[serde(default)]
    pub libraries: IndexMap<String, LockEntry>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            libraries: IndexMap::new(),
        }
    }
}

impl LockFile {
    /// Load `{project_root}/.ams-compose.lock`. An absent file is an empty,
    /// valid lock; a lock written by a newer build is a hard error.
    pub fn load(project_root: &Path) -> Result<Self, LockError> {
        let path = project_root.join(LOCK_FILE);
        let contents = match fs_err::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no lock file; starting empty");
                return Ok(Self::default());
            }
            Err(err) => return Err(LockError::Io { path, err }),
        };

        // Check the version before the full parse; a lock written by a newer
        // build should say "upgrade", not "syntax error".
        #[derive(Deserialize)]
        struct VersionProbe {
            schema_version: u32,
        }
        let probe: VersionProbe =
            serde_yaml::from_str(&contents).map_err(|err| LockError::Parse {
                path: path.clone(),
                err,
            })?;
        if probe.schema_version > SCHEMA_VERSION {
            return Err(LockError::SchemaTooNew {
                path,
                found: probe.schema_version,
            });
        }

        let lock: Self = serde_yaml::from_str(&contents)
            .map_err(|err| LockError::Parse {
                path: path.clone(),
                err,
            })?;
        debug!("loaded lock with {} entries", lock.libraries.len());
        Ok(lock)
    }

    /// Persist atomically: serialize, write to `<lock>.tmp`, fsync, rename.
    pub fn save(&self, project_root: &Path) -> Result<(), LockError> {
        let path = project_root.join(LOCK_FILE);
        let rendered = serde_yaml::to_string(self).map_err(|err| LockError::Parse {
            path: path.clone(),
            err,
        })?;
        ams_fs::write_atomic(&path, rendered).map_err(|err| LockError::Io { path, err })
    }

    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        self.libraries.get(name)
    }

    /// Insert or replace the entry for `name`.
    pub fn upsert(&mut self, name: &str, entry: LockEntry) {
        self.libraries.insert(name.to_owned(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<LockEntry> {
        self.libraries.shift_remove(name)
    }
}
