//! Common error types for the recipe mirror

use thiserror::Error;

/// Common result type for ingestion and query operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the normalizer, store backends and query engine
#[derive(Error, Debug)]
pub enum Error {
    /// Raw payload is not UTF-8 or not a rectangular delimited table
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Required connection settings missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend could not be reached (connect failure or connect timeout)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Backend read or write failed after connecting
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// Non-positive or unparseable page/pageSize
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl Error {
    /// True for errors caused by the caller's request rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidQuery(_))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Error::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => Error::StoreUnavailable(err.to_string()),
            sqlx::Error::Configuration(_) => Error::Config(err.to_string()),
            _ => Error::StoreIo(err.to_string()),
        }
    }
}
