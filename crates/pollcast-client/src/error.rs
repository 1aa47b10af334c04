//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The stream failed after it was opened.
    #[error("transport error: {0}")]
    Transport(String),

    /// Opening the connection timed out.
    #[error("connection timed out")]
    Timeout,

    /// Reading or writing persisted state failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] pollcast_proto::Error),

    /// The consumer has been stopped.
    #[error("consumer stopped")]
    Stopped,
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() {
            Error::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Status(status.as_u16())
        } else {
            Error::Transport(err.to_string())
        }
    }
}
