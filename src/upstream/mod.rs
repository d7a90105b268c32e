// Upstream API module.
// Provides the list/detail contract, its HTTP implementation, and response types.

pub mod client;
pub mod endpoints;
pub mod retry;
pub mod types;

use async_trait::async_trait;

use crate::error::FetchError;

pub use client::HttpUpstream;
pub use retry::{RetryPolicy, Retrying};
pub use types::{Item, ItemId, ItemType};

/// Read-only access to a ranked list and its per-item details.
///
/// Implementations issue exactly one upstream request per call and never
/// retry on their own; see [`Retrying`] for that.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// The full ranked list of identifiers, untruncated.
    async fn list_top(&self) -> Result<Vec<ItemId>, FetchError>;

    /// The record for one identifier.
    async fn get_item(&self, id: ItemId) -> Result<Item, FetchError>;
}

#[async_trait]
impl<U: Upstream + ?Sized> Upstream for std::sync::Arc<U> {
    async fn list_top(&self) -> Result<Vec<ItemId>, FetchError> {
        (**self).list_top().await
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, FetchError> {
        (**self).get_item(id).await
    }
}
