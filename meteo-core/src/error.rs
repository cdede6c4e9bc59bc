//! Typed errors surfaced by the core crate.

/// Failure to reshape a columnar block into a [`crate::TimeSeries`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("sampling interval must be positive, got {0}s")]
    InvalidInterval(i64),
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
    #[error("variable '{key}' has {actual} values but the time axis has {expected}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Failure of a request to a remote weather or geocoding service.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{service} request failed with status {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Location service errors. Permission denial and disabled services are not
/// errors; they surface as `None` from the tracker.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("location service unavailable")]
    Unavailable,
    #[error("location lookup failed: {0}")]
    Lookup(#[from] FetchError),
    #[error("location error: {0}")]
    Other(String),
}
