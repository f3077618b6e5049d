//! The persisted data model: the user-authored manifest, the lock file, and
//! the per-library provenance record.

pub use lock::{
    InstallStatus, LockEntry, LockError, LockFile, ValidationStatus, LOCK_FILE, SCHEMA_VERSION,
};
pub use manifest::{
    ImportSpec, Manifest, ManifestError, DEFAULT_LIBRARY_ROOT, MANIFEST_FILE,
};
pub use provenance::{Provenance, ProvenanceError, PROVENANCE_FILE};

mod lock;
mod manifest;
mod provenance;
