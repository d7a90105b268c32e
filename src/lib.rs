//! Read-through caching proxy for "top N items" from a list-and-detail API.
//!
//! [`Aggregator`] fetches the ranked id list from an [`Upstream`], resolves
//! the first N ids concurrently, and memoizes the assembled result per N in
//! a bounded [`TtlCache`].

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod upstream;

pub use aggregator::Aggregator;
pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use config::{Config, ConfigError};
pub use error::{AggregationError, FetchError, Result};
pub use upstream::{HttpUpstream, Item, ItemId, RetryPolicy, Retrying, Upstream};
