//! Error taxonomy of the ingestion pipeline.
//!
//! Fetch, parse and load errors are contained at the day boundary by the
//! orchestrator. A [`TransformError`] means validation let through a row the
//! transformer cannot map and aborts the run.

use chrono::NaiveDate;
use thiserror::Error;

use crate::pipeline::summary::RunSummary;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("refusing to fetch {day}: gas day is in the future")]
    FutureDate { day: NaiveDate },

    #[error("request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    #[error("HTTP {status} from {url} after {attempts} attempt(s)")]
    Status {
        status: u16,
        url: String,
        attempts: u32,
    },

    #[error("empty response body from {url}")]
    EmptyBody { url: String },

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unbalanced quoting: a quoted field is never closed")]
    UnbalancedQuotes,

    #[error("response has no header line")]
    MissingHeader,

    #[error("header has a single column ({header:?}); wrong delimiter?")]
    SingleColumnHeader { header: String },

    #[error("CSV error at line {line}: {message}")]
    Csv { line: u64, message: String },
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("line {line}: row was not accepted by validation")]
    NotAccepted { line: u64 },

    #[error("line {line}: accepted row has no usable `{column}`")]
    MissingField { line: u64, column: &'static str },

    #[error("line {line}: accepted row has unparseable `{column}` value {value:?}")]
    BadValue {
        line: u64,
        column: &'static str,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("load task failed: {0}")]
    Task(String),

    #[error("upsert of {key} changed no rows")]
    Lost { key: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no day could be loaded ({} failed)", summary.failures.len())]
    NoDaySucceeded { summary: Box<RunSummary> },

    #[error("transform contract violated on {day}: {source}")]
    Transform {
        day: NaiveDate,
        #[source]
        source: TransformError,
    },

    #[error("store unavailable: {0}")]
    Store(#[from] LoadError),
}
