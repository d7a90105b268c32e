// Upstream API endpoint functions.
// Typed list and detail lookups on top of the HTTP client.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::FetchError;

use super::Upstream;
use super::client::HttpUpstream;
use super::types::{Item, ItemId};

const TOP_LIST_ENDPOINT: &str = "/topstories.json";

fn item_endpoint(id: ItemId) -> String {
    format!("/item/{}.json", id)
}

impl HttpUpstream {
    /// Get the ranked list of top identifiers.
    pub async fn top_ids(&self) -> Result<Vec<ItemId>, FetchError> {
        let response = self.get(TOP_LIST_ENDPOINT).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::UpstreamUnavailable(format!(
                "top list not found at {}",
                response.url()
            )));
        }
        let ids: Vec<ItemId> = response.json().await?;
        Ok(ids)
    }

    /// Get a single item by id.
    ///
    /// The upstream answers an unknown id with either a 404 or a `null` body.
    pub async fn item(&self, id: ItemId) -> Result<Item, FetchError> {
        let response = self.get(&item_endpoint(id)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::ItemMissing(id));
        }
        let item: Option<Item> = response.json().await?;
        item.ok_or(FetchError::ItemMissing(id))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn list_top(&self) -> Result<Vec<ItemId>, FetchError> {
        self.top_ids().await
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, FetchError> {
        self.item(id).await
    }
}
