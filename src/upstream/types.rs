// Upstream API response types.
// Defines the item record returned by the detail endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of an upstream item.
pub type ItemId = u64;

/// Item kind as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Story,
    Comment,
    Job,
    Poll,
    Pollopt,
    #[serde(other)]
    Unknown,
}

/// A single upstream record.
///
/// Only `id` is decoded. Every other field is kept as the upstream sent it,
/// explicit nulls and unexpected types included, and written back unchanged.
/// The accessors read well-known fields and return `None` when a field is
/// absent or not of the expected shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    /// Minimal record carrying only an id.
    pub fn with_id(id: ItemId) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Raw value of any field other than `id`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn item_type(&self) -> Option<ItemType> {
        self.get("type")
            .and_then(|v| ItemType::deserialize(v).ok())
    }

    pub fn by(&self) -> Option<&str> {
        self.str_field("by")
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("url")
    }

    pub fn text(&self) -> Option<&str> {
        self.str_field("text")
    }

    pub fn score(&self) -> Option<i64> {
        self.get("score").and_then(Value::as_i64)
    }

    /// Creation time, from Unix seconds.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.get("time")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.get("parent").and_then(Value::as_u64)
    }

    /// Child ids; non-numeric entries are skipped.
    pub fn kids(&self) -> Vec<ItemId> {
        self.get("kids")
            .and_then(Value::as_array)
            .map(|kids| kids.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default()
    }
}
