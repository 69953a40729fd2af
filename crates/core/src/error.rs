//! Error model for the data layer.

use thiserror::Error;

/// A queue payload that cannot become a [`Job`](crate::Job).
///
/// Parse failures never produce a published result; the worker logs and
/// drops the payload.
#[derive(Debug, Error)]
pub enum JobParseError {
    /// Not JSON, or JSON of the wrong shape (missing `invocationId`/`code`,
    /// wrong field types).
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A runtime name that cannot be used as a queue key segment.
    #[error("invalid runtime name: {0:?}")]
    InvalidRuntime(String),
}
