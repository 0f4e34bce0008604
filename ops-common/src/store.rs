use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::filter::Filter;

/// A row as returned by the store: a JSON object keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Enumeration of errors for operations against the store.
/// Transport errors are wrapped to keep the table and verb that failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{method} {table} request failed with: {error}")]
    RequestError {
        method: &'static str,
        table: String,
        error: reqwest::Error,
    },
    #[error("{method} {table} was rejected with status {status}: {message}")]
    ApiError {
        method: &'static str,
        table: String,
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("could not decode {table} rows: {error}")]
    DecodeError {
        table: String,
        error: serde_json::Error,
    },
    #[error("refusing to delete from {0} without a filter")]
    UnfilteredDelete(String),
    #[error("failed to build http client: {0}")]
    ClientError(reqwest::Error),
    #[error("invalid store url {url}: {error}")]
    InvalidUrl { url: String, error: url::ParseError },
}

impl StoreError {
    /// The PostgREST / Postgres error code, when the store returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::ApiError { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The remote query interface the tools are written against.
///
/// Every call is a single remote command: there is no transaction spanning calls, and
/// implementations must not retry.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetch `columns` (comma separated, or `*`) of the rows matching `filter`.
    async fn select(&self, table: &str, columns: &str, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Delete the rows matching `filter` and return them.
    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Insert `rows` and return them as stored.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>>;
}

/// Deserialize store rows into a typed struct.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Row>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|error| StoreError::DecodeError {
                table: table.to_owned(),
                error,
            })
        })
        .collect()
}

/// Serialize a typed struct into a store row.
pub fn encode_row<T: serde::Serialize>(table: &str, value: &T) -> StoreResult<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::DecodeError {
            table: table.to_owned(),
            error: serde::de::Error::custom(format!("expected an object, got {other}")),
        }),
        Err(error) => Err(StoreError::DecodeError {
            table: table.to_owned(),
            error,
        }),
    }
}
