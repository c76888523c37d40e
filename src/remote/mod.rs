//! Remote menu store
//!
//! The authoritative copy of the menu lives in a PostgREST-style backend.
//! The cache only needs whole-collection reads and single-row writes, so
//! rows travel as JSON values and are typed at the edges.

pub mod client;

pub use client::RestClient;
pub use crate::models::Collection;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::errors::{RemoteError, RemoteResult};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every row of a collection
    async fn fetch_all(&self, collection: Collection) -> RemoteResult<Vec<Value>>;

    /// Insert a row and return it as stored
    async fn insert(&self, collection: Collection, row: Value) -> RemoteResult<Value>;

    /// Patch the row with `id` and return it as stored
    async fn update(&self, collection: Collection, id: &str, patch: Value) -> RemoteResult<Value>;

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()>;
}

/// Fetch a collection and decode its rows
///
/// Rows that do not decode are logged and left out so one malformed row
/// does not hide the rest of the menu.
pub async fn fetch_records<T: DeserializeOwned>(
    remote: &dyn RemoteStore,
    collection: Collection,
) -> RemoteResult<Vec<T>> {
    let rows = remote.fetch_all(collection).await?;
    let total = rows.len();
    let records: Vec<T> = rows
        .into_iter()
        .filter_map(|row| match decode_row(collection, row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping row: {e}");
                None
            }
        })
        .collect();
    if records.len() < total {
        warn!(
            "Decoded {} of {} {} rows",
            records.len(),
            total,
            collection
        );
    }
    Ok(records)
}

/// Decode one row returned by the store
pub fn decode_row<T: DeserializeOwned>(collection: Collection, row: Value) -> RemoteResult<T> {
    serde_json::from_value(row).map_err(|e| RemoteError::Decode {
        collection: collection.to_string(),
        message: e.to_string(),
    })
}
