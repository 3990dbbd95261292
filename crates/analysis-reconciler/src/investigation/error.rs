//! Investigation error taxonomy.
//!
//! Classification is binary and depends only on the transport outcome:
//! timeouts, connection failures and overload statuses are transient;
//! everything else is permanent.

use std::fmt;

use thiserror::Error;

/// Result type alias for investigation transport calls.
pub type TransportResult<T> = Result<T, InvestigationError>;

/// Whether a failed call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Map a non-2xx HTTP status onto the taxonomy.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        429 | 502 | 503 | 504 => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvestigationError {
    #[error("investigation request timed out: {0}")]
    Timeout(String),

    #[error("connection to investigation service failed: {0}")]
    Connection(String),

    #[error("investigation API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid investigation response: {0}")]
    Decode(String),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl InvestigationError {
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout(_) | Self::Connection(_) => ErrorClass::Transient,
            Self::Api { status, .. } => classify_status(*status),
            Self::Decode(_) | Self::MaxRetriesExceeded { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<reqwest::Error> for InvestigationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::api(status.as_u16(), err.to_string())
        } else if err.is_builder() {
            // Malformed request URL or body; retrying cannot fix it.
            Self::api(400, err.to_string())
        } else {
            // connect / request / body errors all mean the exchange never
            // completed at the transport level.
            Self::Connection(err.to_string())
        }
    }
}
