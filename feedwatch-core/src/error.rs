use std::path::PathBuf;

use thiserror::Error;

/// Raised when a timestamp matches none of the accepted layouts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized date format: {input:?}")]
pub struct DateFormatError {
    pub input: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed feed markup: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("invalid date in <{field}>: {source}")]
    Date {
        field: &'static str,
        #[source]
        source: DateFormatError,
    },
    #[error("invalid number in <{field}>: {value:?}")]
    Number { field: &'static str, value: String },
    #[error("invalid weekday in <skipDays>: {value:?}")]
    Weekday { value: String },
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed parsing error: {0}")]
    Parse(#[from] ParseError),
    #[error("feed acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
