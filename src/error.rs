pub type Result<T> = std::result::Result<T, Error>;

use reqwest::StatusCode;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("couldn't retrieve any page: {}", list_failures(.0))]
    NoPagesFetched(Vec<FetchError>),
    #[error("Couldn't build the http client")]
    ClientBuildError(#[source] reqwest::Error),
    #[error("invalid selector pattern for `{field}`")]
    SelectorError {
        field: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("selector pattern for `{field}` has no `{group}` capture group")]
    SelectorMissingGroup {
        field: &'static str,
        group: &'static str,
    },
    #[error("Error parsing selector config")]
    SelectorConfigError(#[from] serde_json::Error),
    #[error("Error reading or writing csv")]
    CsvError(#[from] csv::Error),
    #[error("Io error")]
    IoError(#[from] std::io::Error),
}

fn list_failures(failures: &[FetchError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to retrieve a page, either a non-success status (403 when the
/// site blocks us) or a transport failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. } | FetchError::Transport { url, .. } => url,
        }
    }

    /// 429 and 5xx responses and transport failures may succeed on another try,
    /// any other client error (403 in particular) won't.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Transport { .. } => true,
        }
    }
}

/// Why a single processor entry couldn't be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },
    #[error("field `{field}` isn't a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("processor name is empty")]
    EmptyName,
}
