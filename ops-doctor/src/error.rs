use thiserror::Error;

/// Errors that keep the diagnostics from running at all. Failed checks and unreachable
/// endpoints are not errors: they show up in the reports.
#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("failed to build http client: {0}")]
    ClientError(#[from] reqwest::Error),
}
