use std::process::ExitCode;

pub(crate) use clean::clean;
pub(crate) use init::init;
pub(crate) use list::list;
pub(crate) use reconcile::reconcile;
pub(crate) use schema::schema;
pub(crate) use validate::validate;

mod clean;
mod init;
mod list;
mod reconcile;
mod schema;
mod validate;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,
    /// The command ran, but some library is in a bad state.
    Failure,
    /// The command could not run (configuration or environment error).
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::from(0),
            ExitStatus::Failure => ExitCode::from(1),
            ExitStatus::Error => ExitCode::from(2),
        }
    }
}
