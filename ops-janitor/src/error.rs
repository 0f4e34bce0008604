use ops_common::auth::AuthError;
use ops_common::store::StoreError;
use thiserror::Error;

/// Enumeration of errors that end a janitor operation as a whole.
/// Per-step failures inside a purge are not errors: they are recorded in the purge report.
#[derive(Error, Debug)]
pub enum JanitorError {
    #[error("failed to query {table}: {error}")]
    QueryError {
        table: &'static str,
        error: StoreError,
    },
    #[error("failed to insert into {table}: {error}")]
    InsertError {
        table: &'static str,
        error: StoreError,
    },
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("could not identify the current user: {0}")]
    AuthError(#[from] AuthError),
    #[error("{0} is not a valid janitor mode")]
    InvalidMode(String),
}
