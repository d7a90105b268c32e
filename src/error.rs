// Error types for topnews.
// Upstream fetch failures, aggregation failures, and their status mapping.

use std::time::Duration;

use thiserror::Error;

use crate::upstream::ItemId;

/// Failure of a single upstream call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("item {0} not found upstream")]
    ItemMissing(ItemId),
}

impl FetchError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::UpstreamUnavailable(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::UpstreamUnavailable(err.to_string())
    }
}

/// Failure of a whole top-N aggregation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("item {0} not found upstream")]
    ItemMissing(ItemId),

    #[error("aggregation timed out after {0:?}")]
    Timeout(Duration),

    #[error("count must be positive, got {0}")]
    InvalidArgument(i64),
}

impl AggregationError {
    /// HTTP status a request handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AggregationError::InvalidArgument(_) => 400,
            AggregationError::UpstreamUnavailable(_) | AggregationError::ItemMissing(_) => 502,
            AggregationError::Timeout(_) => 504,
        }
    }
}

impl From<FetchError> for AggregationError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::UpstreamUnavailable(reason) => AggregationError::UpstreamUnavailable(reason),
            FetchError::ItemMissing(id) => AggregationError::ItemMissing(id),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregationError>;
