use crate::cells::CellError;
use crate::providers::meteostat::error::StationCacheError;
use crate::types::error::TableError;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Data download or decompression failed")]
    DownloadIo(#[from] std::io::Error),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),

    #[error("CSV for station {station} has {found} columns, expected {expected}")]
    SchemaMismatch {
        station: String,
        expected: usize,
        found: usize,
    },

    #[error("Provider returned an invalid table")]
    InvalidTable(#[from] TableError),

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error("Station catalogue unavailable")]
    StationCache(#[from] StationCacheError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether repeating the same request might succeed.
    ///
    /// Transport faults, server errors and rate limiting are transient; parse
    /// errors and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::NetworkRequest(..) | ProviderError::DownloadIo(_) => true,
            ProviderError::HttpStatus { status, .. }
            | ProviderError::StationCache(StationCacheError::HttpStatus { status, .. }) => {
                is_transient_status(*status)
            }
            ProviderError::StationCache(StationCacheError::NetworkRequest(..))
            | ProviderError::StationCache(StationCacheError::DownloadIo(_)) => true,
            _ => false,
        }
    }

    /// Builds the error for a non-success HTTP response.
    pub(crate) fn from_status_error(url: String, error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => ProviderError::HttpStatus {
                url,
                status,
                source: error,
            },
            None => ProviderError::NetworkRequest(url, error),
        }
    }
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}
