use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::lock::SCHEMA_VERSION;

/// File name of the provenance record written into every extracted library.
pub const PROVENANCE_FILE: &str = ".ams-compose-metadata.yaml";

/// The provenance record: where an installed library came from.
///
/// Written for every library regardless of `checkin`, so a tree that was
/// copied around out-of-band still identifies its upstream. Excluded from
/// tree checksums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub schema_version: u32,
    /// Library name (the manifest key).
    pub library: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
    /// Full commit SHA the extraction was taken from.
    pub commit: String,
    pub source_path: String,
    pub checkin: bool,
    pub license: Option<String>,
    pub license_file: Option<String>,
    pub extracted_at: Timestamp,
}

impl Provenance {
    /// Read the provenance record from an installed library directory.
    pub fn load(library_dir: &Path) -> Result<Self, ProvenanceError> {
        let path = library_dir.join(PROVENANCE_FILE);
        let contents = fs_err::read_to_string(&path).map_err(|err| ProvenanceError::Io {
            path: path.clone(),
            err,
        })?;
        serde_yaml::from_str(&contents).map_err(|err| ProvenanceError::Parse { path, err })
    }

    /// Serialize into `dir/.ams-compose-metadata.yaml`.
    pub fn write(&self, dir: &Path) -> Result<(), ProvenanceError> {
        let path = dir.join(PROVENANCE_FILE);
        let rendered = serde_yaml::to_string(self).map_err(|err| ProvenanceError::Parse {
            path: path.clone(),
            err,
        })?;
        fs_err::write(&path, rendered).map_err(|err| ProvenanceError::Io { path, err })
    }

    pub fn new(
        library: &str,
        repo: &str,
        reference: &str,
        commit: &str,
        source_path: &str,
        checkin: bool,
        license: Option<String>,
        license_file: Option<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            library: library.to_owned(),
            repo: repo.to_owned(),
            reference: reference.to_owned(),
            commit: commit.to_owned(),
            source_path: source_path.to_owned(),
            checkin,
            license,
            license_file,
            extracted_at: Timestamp::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    #[error("failed to access `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let provenance = Provenance::new(
            "widget",
            "https://git.example.com/org/widget.git",
            "v1.2.0",
            "0123456789abcdef0123456789abcdef01234567",
            "src/widget",
            true,
            Some("MIT".into()),
            Some("LICENSE".into()),
        );
        provenance.write(dir.path()).unwrap();

        let loaded = Provenance::load(dir.path()).unwrap();
        assert_eq!(loaded, provenance);
        assert!(dir.path().join(PROVENANCE_FILE).exists());
    }

    #[test]
    fn missing_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Provenance::load(dir.path()),
            Err(ProvenanceError::Io { .. })
        ));
    }
}
