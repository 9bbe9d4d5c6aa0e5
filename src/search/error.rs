//! Error taxonomy of the search pipeline.

use crate::search::backend::BackendError;
use thiserror::Error;

/// Failure of a whole search invocation.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Caller supplied neither keywords nor identities, or both at once.
    #[error("invalid query request: {0}")]
    InvalidQueryRequest(String),

    /// Indexing/storage backend unreachable, timed out, or failed the query.
    #[error("search backend unavailable")]
    BackendUnavailable(#[from] BackendError),
}

impl SearchError {
    /// Stable machine-readable code for robot output.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::InvalidQueryRequest(_) => "invalid_query_request",
            SearchError::BackendUnavailable(_) => "backend_unavailable",
        }
    }
}

/// A single raw hit that could not be turned into a course.
///
/// Not fatal: the normalizer skips the record and keeps the rest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed result at position {position}: {reason}")]
pub struct MalformedResult {
    /// Index of the record in the executor's output.
    pub position: usize,
    pub reason: String,
}
