//! Error types for splitdl
//!
//! One enum covers the whole transfer pipeline. Errors raised inside a single
//! part attempt are retryable; the coordinator only ever surfaces terminal ones.

use std::fmt;
use std::time::Duration;

/// Main error type for splitdl operations
#[derive(Debug)]
pub enum Error {
    /// Metadata (HEAD) probe failed before any part work started
    ProbeError(String),

    /// Server answered a ranged GET with something other than 206
    RangeRejected { part: usize, status: u16 },

    /// A single attempt exceeded the job's per-attempt timeout
    AttemptTimeout { part: usize, timeout: Duration },

    /// A part failed every attempt in its retry budget
    RetryExhausted {
        part: usize,
        attempts: u32,
        last: Box<Error>,
    },

    /// Concatenating part files into the destination failed
    MergeError(String),

    /// HTTP-level failure (status or body decoding)
    HttpError(String),

    /// Network connectivity issues
    NetworkError(String),

    /// File I/O error
    IoError(std::io::Error),

    /// Invalid job configuration
    InvalidInput(String),

    /// The job was cancelled before completing
    Cancelled,
}

impl Error {
    /// Whether a failure inside one attempt may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RangeRejected { .. }
                | Error::AttemptTimeout { .. }
                | Error::HttpError(_)
                | Error::NetworkError(_)
                | Error::IoError(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ProbeError(msg) => {
                write!(f, "Probe failed: {}", msg)
            }
            Error::RangeRejected { part, status } => {
                write!(f, "Part {} range request rejected with status {}", part, status)
            }
            Error::AttemptTimeout { part, timeout } => {
                write!(f, "Part {} attempt timed out after {:?}", part, timeout)
            }
            Error::RetryExhausted {
                part,
                attempts,
                last,
            } => {
                write!(
                    f,
                    "Part {} failed after {} attempt(s): {}",
                    part, attempts, last
                )
            }
            Error::MergeError(msg) => {
                write!(f, "Merge failed: {}", msg)
            }
            Error::HttpError(msg) => {
                write!(f, "HTTP error: {}", msg)
            }
            Error::NetworkError(msg) => {
                write!(f, "Network error: {}", msg)
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {}", err)
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            Error::Cancelled => {
                write!(f, "Download cancelled")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::RetryExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Error::NetworkError(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

/// Convenience result type for splitdl operations
pub type Result<T> = std::result::Result<T, Error>;
