//! Reconciliation of the manifest against the lock file and the filesystem:
//! planning, per-library installation, integrity validation, and cleanup of
//! unreferenced state.

pub use clean::{clean, CleanOptions, CleanReport};
pub use install::{install, InstallOptions, InstallReport, LibraryResult};
pub use plan::{plan, Action, Plan, PlanOptions, PlannedLibrary};
pub use validate::{validate_installation, ValidationReport, ValidationResult};

mod clean;
mod install;
mod plan;
mod validate;

/// Errors that abort a whole run before (or instead of) any per-library
/// work. Per-library failures never surface here; they are captured in the
/// per-library results.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    #[error(transparent)]
    Manifest(#[from] ams_lock::ManifestError),
    #[error(transparent)]
    Lock(#[from] ams_lock::LockError),
    #[error("failed to lock the mirror cache")]
    CacheLock(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
