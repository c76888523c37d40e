use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::serde_helpers;

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    #[serde(deserialize_with = "serde_helpers::id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// URL or base64 data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// URL or base64 data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Columns the cache does not interpret (opening hours, socials, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "serde_helpers::id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "serde_helpers::null_as_default")]
    pub display_order: i64,
    #[serde(default = "default_true", deserialize_with = "serde_helpers::null_as_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "serde_helpers::id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "serde_helpers::null_as_default")]
    pub price: f64,
    #[serde(
        default,
        deserialize_with = "serde_helpers::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_id: Option<String>,
    /// URL or base64 data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default = "default_true", deserialize_with = "serde_helpers::null_as_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "serde_helpers::id_list")]
    pub tags: Vec<String>,
    #[serde(
        default,
        deserialize_with = "serde_helpers::null_as_default",
        skip_serializing_if = "is_false"
    )]
    pub featured: bool,
}

impl Product {
    /// Case-insensitive substring match on name and description
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }
}

/// Gallery entry; `url` is a remote URL or a base64 data URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryImage {
    #[serde(deserialize_with = "serde_helpers::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_helpers::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "serde_helpers::null_as_default")]
    pub url: String,
    /// Size in bytes as reported at upload time
    #[serde(default, deserialize_with = "serde_helpers::null_as_default")]
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "serde_helpers::id_list")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTag {
    #[serde(deserialize_with = "serde_helpers::id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}
