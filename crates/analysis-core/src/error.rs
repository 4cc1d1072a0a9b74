use std::time::Duration;

use thiserror::Error;

/// Upstream retrieval failure.
///
/// Cloneable so a single in-flight load can hand the same outcome to every
/// waiter on the cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Load abandoned: {0}")]
    Abandoned(String),
}

impl FetchError {
    pub fn status(status: u16, url: impl Into<String>) -> Self {
        Self::Status {
            status,
            url: url.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Unknown ticker or identifier. Expected and user-correctable.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Valuation inputs outside the model's domain.
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl AnalysisError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }
}
