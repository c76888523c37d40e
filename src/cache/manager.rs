use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::metadata::{CacheMetadata, CacheStats, PersistOutcome};
use super::query::{self, ProductFilter};
use crate::config::CacheConfig;
use crate::config::defaults::{
    CACHE_CHUNK_COUNT_KEY, CACHE_CHUNK_KEY_PREFIX, CACHE_KEY, CACHE_TIMESTAMP_KEY,
    CACHE_VERSION_KEY, LAST_MODIFIED_KEY,
};
use crate::errors::{CacheResult, StorageResult};
use crate::models::{Category, GalleryImage, MenuDocument, Product, ProductTag, Restaurant};
use crate::optimizer::strip_base64_images;
use crate::storage::KeyValueStore;
use crate::utils::Clock;
use crate::utils::human_format::format_bytes;

#[derive(Debug, Default)]
struct CacheState {
    data: Option<MenuDocument>,
    timestamp: Option<i64>,
    last_outcome: Option<PersistOutcome>,
}

/// In-memory copy of the menu document backed by a key/value store
///
/// Several managers may share one store; each keeps its own in-memory copy
/// and notices writes by the others through the last-modified marker.
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            state: RwLock::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a manager and hydrate it from the store
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> CacheResult<Self> {
        let manager = Self::new(store, clock, config);
        manager.load().await?;
        Ok(manager)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Hydrate in-memory state from the store
    ///
    /// A persisted cache written under another schema version, or one whose
    /// document no longer parses, is wiped. Returns whether a document was
    /// loaded.
    pub async fn load(&self) -> CacheResult<bool> {
        let version = self.store.get(CACHE_VERSION_KEY).await?;
        let has_document = self.store.get(CACHE_KEY).await?.is_some()
            || self.store.get(CACHE_CHUNK_COUNT_KEY).await?.is_some();

        match version {
            Some(v) if v == self.config.schema_version => {}
            None if !has_document => {
                debug!("No persisted cache found");
                return Ok(false);
            }
            other => {
                info!(
                    "Cache version changed ({} -> {}), wiping persisted cache",
                    other.as_deref().unwrap_or("none"),
                    self.config.schema_version
                );
                self.wipe_persisted(true).await?;
                return Ok(false);
            }
        }

        let Some(payload) = self.read_document_payload().await? else {
            debug!("Persisted cache has a version tag but no document");
            return Ok(false);
        };

        let document: MenuDocument = match serde_json::from_str(&payload) {
            Ok(document) => document,
            Err(e) => {
                warn!("Persisted cache document is corrupt, wiping: {e}");
                self.wipe_persisted(false).await?;
                return Ok(false);
            }
        };

        let timestamp = self
            .store
            .get(CACHE_TIMESTAMP_KEY)
            .await?
            .and_then(|t| t.trim().parse::<i64>().ok());

        debug!(
            "Loaded cached document ({}, {} products, {} categories)",
            format_bytes(payload.len() as u64),
            document.products.len(),
            document.categories.len()
        );

        let mut state = self.state.write().await;
        state.data = Some(document);
        state.timestamp = timestamp;
        Ok(true)
    }

    /// Replace the cached document and persist it
    ///
    /// `force_update` also writes the last-modified marker so other contexts
    /// sharing the store treat their copies as stale. The in-memory document
    /// is replaced whatever the persistence outcome.
    pub async fn set_cache(&self, data: MenuDocument, force_update: bool) -> PersistOutcome {
        let now = self.clock.now_ms();

        {
            let mut state = self.state.write().await;
            state.data = Some(data.clone());
            state.timestamp = Some(now);
        }

        if force_update && let Err(e) = self.write_marker(now).await {
            warn!("Failed to write last-modified marker: {e}");
        }

        let outcome = self.persist(&data, now).await;
        match &outcome {
            PersistOutcome::Full { .. } => debug!("Cache persisted: {outcome}"),
            PersistOutcome::Chunked { .. } => info!("Cache persisted: {outcome}"),
            PersistOutcome::Reduced { .. } => warn!("Cache persisted: {outcome}"),
            PersistOutcome::MemoryOnly => {
                error!("Cache could not be persisted, keeping it in memory only")
            }
        }

        self.state.write().await.last_outcome = Some(outcome.clone());
        outcome
    }

    /// The cached document when it is still valid
    pub async fn get_cache(&self) -> Option<MenuDocument> {
        if self.is_valid().await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.state.read().await.data.clone()
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Whether the in-memory document can be served
    ///
    /// Invalid without data or timestamp, once older than the TTL, or when
    /// another context has written a newer last-modified marker.
    pub async fn is_valid(&self) -> bool {
        let timestamp = {
            let state = self.state.read().await;
            match (&state.data, state.timestamp) {
                (Some(_), Some(timestamp)) => timestamp,
                _ => return false,
            }
        };

        let age = self.clock.now_ms() - timestamp;
        if age > self.ttl_ms() {
            debug!("Cache expired ({age}ms old)");
            return false;
        }

        match self.last_modified().await {
            Some(marker) if marker > timestamp => {
                debug!("Cache invalidated by a newer write elsewhere ({marker} > {timestamp})");
                false
            }
            _ => true,
        }
    }

    /// Drop the in-memory copy and tell every other context to do the same
    pub async fn force_refresh(&self) -> CacheResult<()> {
        {
            let mut state = self.state.write().await;
            state.data = None;
            state.timestamp = None;
        }
        self.write_marker(self.clock.now_ms()).await?;
        info!("Cache invalidated");
        Ok(())
    }

    /// Forget the cached document, in memory and in the store
    ///
    /// The last-modified marker stays so peers still invalidate.
    pub async fn clear(&self) -> CacheResult<()> {
        {
            let mut state = self.state.write().await;
            state.data = None;
            state.timestamp = None;
        }
        self.wipe_persisted(false).await?;
        info!("Cache cleared");
        Ok(())
    }

    /// Categories of the in-memory document, by display order
    pub async fn categories(&self, active_only: bool) -> Vec<Category> {
        match &self.state.read().await.data {
            Some(doc) => query::categories(doc, active_only),
            None => Vec::new(),
        }
    }

    /// Products of the in-memory document in menu order
    pub async fn products(&self, filter: &ProductFilter) -> Vec<Product> {
        match &self.state.read().await.data {
            Some(doc) => query::products(doc, filter),
            None => Vec::new(),
        }
    }

    pub async fn restaurant(&self) -> Option<Restaurant> {
        self.state
            .read()
            .await
            .data
            .as_ref()
            .and_then(|doc| doc.restaurant.clone())
    }

    pub async fn gallery_images(&self) -> Vec<GalleryImage> {
        self.state
            .read()
            .await
            .data
            .as_ref()
            .map(|doc| doc.gallery_images.clone())
            .unwrap_or_default()
    }

    pub async fn product_tags(&self) -> Vec<ProductTag> {
        self.state
            .read()
            .await
            .data
            .as_ref()
            .map(|doc| doc.product_tags.clone())
            .unwrap_or_default()
    }

    /// The in-memory document regardless of validity
    pub async fn snapshot(&self) -> Option<MenuDocument> {
        self.state.read().await.data.clone()
    }

    /// Persisted last-modified marker; unreadable markers count as absent
    pub async fn last_modified(&self) -> Option<i64> {
        match self.store.get(LAST_MODIFIED_KEY).await {
            Ok(value) => value.and_then(|v| v.trim().parse::<i64>().ok()),
            Err(e) => {
                warn!("Failed to read last-modified marker: {e}");
                None
            }
        }
    }

    pub async fn metadata(&self) -> CacheMetadata {
        let timestamp = self.state.read().await.timestamp;
        let now = self.clock.now_ms();
        CacheMetadata {
            timestamp,
            version: self.config.schema_version.clone(),
            last_modified: self.last_modified().await,
            age_ms: timestamp.map(|t| now - t),
            valid: self.is_valid().await,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.state.read().await.last_outcome.clone(),
        )
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.config.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    async fn write_marker(&self, now: i64) -> StorageResult<()> {
        self.store.set(LAST_MODIFIED_KEY, &now.to_string()).await
    }

    /// Full payload first, then the image-stripped payload, then give up
    async fn persist(&self, data: &MenuDocument, now: i64) -> PersistOutcome {
        let full_error = match serde_json::to_string(data) {
            Ok(payload) => match self.write_payload(&payload, now).await {
                Ok(outcome) => return outcome,
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };
        warn!("Persisting full cache failed ({full_error}), retrying without inline images");

        let (reduced, stripped_images) = strip_base64_images(data);
        let reduced_error = match serde_json::to_string(&reduced) {
            Ok(payload) => match self.write_payload(&payload, now).await {
                Ok(outcome) => {
                    return PersistOutcome::Reduced {
                        stripped_images,
                        bytes: outcome.bytes(),
                    };
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };
        warn!("Persisting reduced cache failed: {reduced_error}");

        PersistOutcome::MemoryOnly
    }

    /// Write a serialized document, chunking it when above the size limit
    ///
    /// Chunks go under a fresh generation and the manifest is committed only
    /// once every chunk is stored, so a failed write leaves the previous
    /// generation readable.
    async fn write_payload(&self, payload: &str, now: i64) -> StorageResult<PersistOutcome> {
        let limit = self.config.max_persist_bytes;

        let outcome = if payload.len() <= limit {
            self.store.set(CACHE_KEY, payload).await?;
            self.store.remove(CACHE_CHUNK_COUNT_KEY).await?;
            self.sweep_chunks(None).await;
            PersistOutcome::Full {
                bytes: payload.len(),
            }
        } else {
            let generation = match self.chunk_manifest().await? {
                Some(previous) => now.max(previous.generation + 1),
                None => now,
            };
            let pieces = split_on_char_boundaries(payload, limit);
            let manifest = ChunkManifest {
                generation,
                count: pieces.len(),
            };
            if let Err(e) = self.commit_chunks(&manifest, &pieces).await {
                self.discard_chunks(&manifest).await;
                return Err(e);
            }
            if let Err(e) = self.store.remove(CACHE_KEY).await {
                warn!("Failed to remove unchunked cache document: {e}");
            }
            self.sweep_chunks(Some(generation)).await;
            PersistOutcome::Chunked {
                chunks: pieces.len(),
                bytes: payload.len(),
            }
        };

        self.store.set(CACHE_TIMESTAMP_KEY, &now.to_string()).await?;
        self.store
            .set(CACHE_VERSION_KEY, &self.config.schema_version)
            .await?;
        Ok(outcome)
    }

    async fn commit_chunks(&self, manifest: &ChunkManifest, pieces: &[&str]) -> StorageResult<()> {
        for (index, piece) in pieces.iter().enumerate() {
            self.store
                .set(&chunk_key(manifest.generation, index), piece)
                .await?;
        }
        self.store
            .set(CACHE_CHUNK_COUNT_KEY, &manifest.to_string())
            .await
    }

    /// Drop the chunks of an uncommitted generation
    async fn discard_chunks(&self, manifest: &ChunkManifest) {
        for index in 0..manifest.count {
            if let Err(e) = self
                .store
                .remove(&chunk_key(manifest.generation, index))
                .await
            {
                warn!("Failed to discard cache chunk {index}: {e}");
            }
        }
    }

    /// Remove every chunk key outside the `keep` generation
    async fn sweep_chunks(&self, keep: Option<i64>) {
        let keys = match self.store.keys_with_prefix(CACHE_CHUNK_KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list cache chunks: {e}");
                return;
            }
        };
        let kept_prefix = keep.map(generation_prefix);
        for key in keys {
            if kept_prefix.as_ref().is_some_and(|p| key.starts_with(p)) {
                continue;
            }
            if let Err(e) = self.store.remove(&key).await {
                warn!("Failed to remove stale cache chunk {key}: {e}");
            }
        }
    }

    async fn read_document_payload(&self) -> StorageResult<Option<String>> {
        let Some(manifest) = self.chunk_manifest().await? else {
            return self.store.get(CACHE_KEY).await;
        };

        let mut payload = String::new();
        for index in 0..manifest.count {
            match self
                .store
                .get(&chunk_key(manifest.generation, index))
                .await?
            {
                Some(chunk) => payload.push_str(&chunk),
                None => {
                    warn!("Cache chunk {index} of {} is missing", manifest.count);
                    return Ok(None);
                }
            }
        }
        Ok(Some(payload))
    }

    async fn chunk_manifest(&self) -> StorageResult<Option<ChunkManifest>> {
        let Some(raw) = self.store.get(CACHE_CHUNK_COUNT_KEY).await? else {
            return Ok(None);
        };
        let manifest = ChunkManifest::parse(&raw);
        if manifest.is_none() {
            warn!("Ignoring unreadable cache chunk manifest {raw:?}");
        }
        Ok(manifest)
    }

    async fn wipe_persisted(&self, include_marker: bool) -> StorageResult<()> {
        let chunk_keys = self.store.keys_with_prefix(CACHE_CHUNK_KEY_PREFIX).await?;
        for key in chunk_keys {
            self.store.remove(&key).await?;
        }
        self.store.remove(CACHE_CHUNK_COUNT_KEY).await?;
        self.store.remove(CACHE_KEY).await?;
        self.store.remove(CACHE_TIMESTAMP_KEY).await?;
        if include_marker {
            self.store.remove(CACHE_VERSION_KEY).await?;
            self.store.remove(LAST_MODIFIED_KEY).await?;
        }
        Ok(())
    }
}

/// Committed chunk generation, stored as `<generation>:<count>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkManifest {
    generation: i64,
    count: usize,
}

impl ChunkManifest {
    fn parse(raw: &str) -> Option<Self> {
        let (generation, count) = raw.trim().split_once(':')?;
        Some(Self {
            generation: generation.parse().ok()?,
            count: count.parse().ok()?,
        })
    }
}

impl std::fmt::Display for ChunkManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.generation, self.count)
    }
}

fn generation_prefix(generation: i64) -> String {
    format!("{CACHE_CHUNK_KEY_PREFIX}{generation}_")
}

fn chunk_key(generation: i64, index: usize) -> String {
    format!("{}{index}", generation_prefix(generation))
}

/// Split into pieces of at most `max_bytes`, never inside a UTF-8 sequence
fn split_on_char_boundaries(value: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < value.len() {
        let mut end = (start + max_bytes.max(1)).min(value.len());
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + 1;
            while !value.is_char_boundary(end) {
                end += 1;
            }
        }
        pieces.push(&value[start..end]);
        start = end;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::storage::MemoryStore;
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    const START: i64 = 1_700_000_000_000;

    fn document() -> MenuDocument {
        serde_json::from_value(json!({
            "restaurant": {"id": "r1", "name": "Trattoria"},
            "categories": [{"id": "c1", "name": "Pasta", "display_order": 1}],
            "products": [
                {"id": "p1", "name": "Carbonara", "category_id": "c1", "price": 12.5,
                 "image": "data:image/png;base64,AAAA"}
            ]
        }))
        .unwrap()
    }

    fn manager_with(store: &MemoryStore, clock: &ManualClock, config: CacheConfig) -> CacheManager {
        CacheManager::new(Arc::new(store.clone()), Arc::new(clock.clone()), config)
    }

    fn manager(store: &MemoryStore, clock: &ManualClock) -> CacheManager {
        manager_with(store, clock, CacheConfig::default())
    }

    fn named_products(prefix: &str) -> MenuDocument {
        let products: Vec<_> = (0..20)
            .map(|i| json!({"id": format!("p{i}"), "name": format!("{prefix}{i}"), "price": 1.0}))
            .collect();
        serde_json::from_value(json!({ "products": products })).unwrap()
    }

    /// Refuses the second chunk of any generation once armed
    #[derive(Clone, Default)]
    struct FailingChunkStore {
        inner: MemoryStore,
        armed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl KeyValueStore for FailingChunkStore {
        async fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            if self.armed.load(Ordering::SeqCst)
                && key.starts_with(CACHE_CHUNK_KEY_PREFIX)
                && key.ends_with("_1")
            {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size: value.len(),
                    limit: 0,
                });
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> StorageResult<Vec<String>> {
            self.inner.keys().await
        }
    }

    async fn chunk_keys(store: &MemoryStore) -> Vec<String> {
        let mut keys = store
            .keys_with_prefix(CACHE_CHUNK_KEY_PREFIX)
            .await
            .unwrap();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_set_then_get_returns_document() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let cache = manager(&store, &clock);

        let outcome = cache.set_cache(document(), false).await;
        assert!(matches!(outcome, PersistOutcome::Full { .. }));
        assert_eq!(cache.get_cache().await, Some(document()));

        assert_eq!(
            store.get(CACHE_TIMESTAMP_KEY).await.unwrap(),
            Some(START.to_string())
        );
        assert_eq!(
            store.get(CACHE_VERSION_KEY).await.unwrap().as_deref(),
            Some("2.2")
        );
        assert!(store.get(LAST_MODIFIED_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let cache = manager(&store, &clock);
        cache.set_cache(document(), false).await;

        clock.advance(Duration::from_secs(300));
        assert!(cache.is_valid().await);

        clock.advance(Duration::from_millis(1));
        assert!(!cache.is_valid().await);
        assert!(cache.get_cache().await.is_none());

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[tokio::test]
    async fn test_newer_marker_invalidates_peer() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let tab_a = manager(&store, &clock);
        let tab_b = manager(&store, &clock);

        tab_a.set_cache(document(), false).await;
        tab_b.set_cache(document(), false).await;

        clock.advance(Duration::from_secs(10));
        let mut edited = document();
        edited.products[0].price = 14.0;
        tab_b.set_cache(edited.clone(), true).await;

        assert!(!tab_a.is_valid().await);
        assert_eq!(tab_b.get_cache().await, Some(edited));
    }

    #[tokio::test]
    async fn test_force_refresh_drops_document() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let cache = manager(&store, &clock);
        cache.set_cache(document(), false).await;

        cache.force_refresh().await.unwrap();
        assert!(cache.get_cache().await.is_none());
        assert_eq!(cache.last_modified().await, Some(START));
    }

    #[tokio::test]
    async fn test_clear_keeps_marker() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let cache = manager(&store, &clock);
        cache.set_cache(document(), true).await;

        cache.clear().await.unwrap();
        assert!(cache.snapshot().await.is_none());
        assert!(store.get(CACHE_KEY).await.unwrap().is_none());
        assert!(store.get(CACHE_TIMESTAMP_KEY).await.unwrap().is_none());
        assert_eq!(cache.last_modified().await, Some(START));
    }

    #[tokio::test]
    async fn test_load_restores_persisted_document() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        manager(&store, &clock).set_cache(document(), false).await;

        clock.advance(Duration::from_secs(5));
        let reopened = CacheManager::open(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            CacheConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(reopened.get_cache().await, Some(document()));
        assert_eq!(reopened.metadata().await.age_ms, Some(5_000));
    }

    #[tokio::test]
    async fn test_version_mismatch_wipes_store() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let old = manager_with(
            &store,
            &clock,
            CacheConfig {
                schema_version: "2.1".to_string(),
                ..Default::default()
            },
        );
        old.set_cache(document(), true).await;

        let current = manager(&store, &clock);
        assert!(!current.load().await.unwrap());
        assert!(current.snapshot().await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_wiped() {
        let store = MemoryStore::new();
        store.set(CACHE_VERSION_KEY, "2.2").await.unwrap();
        store.set(CACHE_KEY, "{not json").await.unwrap();
        store.set(CACHE_TIMESTAMP_KEY, "1").await.unwrap();

        let cache = manager(&store, &ManualClock::new(START));
        assert!(!cache.load().await.unwrap());
        assert!(store.get(CACHE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_document_is_chunked_and_reassembled() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let config = CacheConfig {
            max_persist_bytes: 64,
            ..Default::default()
        };
        let cache = manager_with(&store, &clock, config.clone());

        let outcome = cache.set_cache(document(), false).await;
        let PersistOutcome::Chunked { chunks, .. } = outcome.clone() else {
            panic!("expected chunked outcome, got {outcome:?}");
        };
        assert!(chunks > 1);
        assert!(store.get(CACHE_KEY).await.unwrap().is_none());
        assert_eq!(chunk_keys(&store).await.len(), chunks);

        let reopened = manager_with(&store, &clock, config);
        assert!(reopened.load().await.unwrap());
        assert_eq!(reopened.snapshot().await, Some(document()));

        // Shrinking back under the limit removes the chunks
        let small = manager(&store, &clock);
        assert!(matches!(
            small.set_cache(document(), false).await,
            PersistOutcome::Full { .. }
        ));
        assert!(
            store
                .keys_with_prefix(CACHE_CHUNK_KEY_PREFIX)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_quota_falls_back_to_reduced_payload() {
        let full_len = serde_json::to_string(&document()).unwrap().len();
        let store = MemoryStore::with_quota(Some(full_len - 1));
        let clock = ManualClock::new(START);
        let cache = manager(&store, &clock);

        let outcome = cache.set_cache(document(), false).await;
        assert!(matches!(
            outcome,
            PersistOutcome::Reduced {
                stripped_images: 1,
                ..
            }
        ));
        // In memory the images are intact
        assert_eq!(cache.get_cache().await, Some(document()));

        let reopened = manager(&store, &clock);
        reopened.load().await.unwrap();
        let persisted = reopened.snapshot().await.unwrap();
        assert_eq!(persisted.products[0].image, None);
    }

    #[tokio::test]
    async fn test_memory_only_when_nothing_fits() {
        let store = MemoryStore::with_quota(Some(8));
        let cache = manager(&store, &ManualClock::new(START));

        let outcome = cache.set_cache(document(), false).await;
        assert_eq!(outcome, PersistOutcome::MemoryOnly);
        assert_eq!(cache.get_cache().await, Some(document()));
        assert_eq!(cache.stats().await.last_outcome, Some(PersistOutcome::MemoryOnly));
    }

    #[tokio::test]
    async fn test_getters_read_in_memory_document() {
        let cache = manager(&MemoryStore::new(), &ManualClock::new(START));
        assert!(cache.products(&ProductFilter::default()).await.is_empty());

        cache.set_cache(document(), false).await;
        assert_eq!(cache.categories(true).await.len(), 1);
        assert_eq!(cache.products(&ProductFilter::active()).await.len(), 1);
        assert_eq!(cache.restaurant().await.map(|r| r.name), Some("Trattoria".into()));
        assert!(cache.gallery_images().await.is_empty());
        assert!(cache.product_tags().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_write_keeps_previous_generation() {
        let store = FailingChunkStore::default();
        let clock = ManualClock::new(START);
        let config = CacheConfig {
            max_persist_bytes: 200,
            ..Default::default()
        };
        let cache = CacheManager::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            config.clone(),
        );

        let first = cache.set_cache(named_products("first"), false).await;
        assert!(matches!(first, PersistOutcome::Chunked { .. }));
        let committed = chunk_keys(&store.inner).await;

        store.armed.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(1));
        let second = cache.set_cache(named_products("second"), false).await;
        assert_eq!(second, PersistOutcome::MemoryOnly);
        assert_eq!(cache.get_cache().await, Some(named_products("second")));

        // Partial chunks of the failed generation are gone
        assert_eq!(chunk_keys(&store.inner).await, committed);

        let reopened = CacheManager::new(Arc::new(store.clone()), Arc::new(clock.clone()), config);
        assert!(reopened.load().await.unwrap());
        assert_eq!(reopened.snapshot().await, Some(named_products("first")));
    }

    #[tokio::test]
    async fn test_full_write_sweeps_orphan_chunks() {
        let store = MemoryStore::new();
        store
            .set(&format!("{CACHE_CHUNK_KEY_PREFIX}42_0"), "stale")
            .await
            .unwrap();
        let cache = manager(&store, &ManualClock::new(START));

        assert!(matches!(
            cache.set_cache(document(), false).await,
            PersistOutcome::Full { .. }
        ));
        assert!(chunk_keys(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_rechunking_replaces_previous_generation() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(START);
        let config = CacheConfig {
            max_persist_bytes: 200,
            ..Default::default()
        };
        let cache = manager_with(&store, &clock, config.clone());

        cache.set_cache(named_products("first"), false).await;
        // Same millisecond still gets a new generation
        let outcome = cache.set_cache(named_products("second"), false).await;
        let PersistOutcome::Chunked { chunks, .. } = outcome.clone() else {
            panic!("expected chunked outcome, got {outcome:?}");
        };
        assert_eq!(chunk_keys(&store).await.len(), chunks);
        assert_eq!(
            store.get(CACHE_CHUNK_COUNT_KEY).await.unwrap(),
            Some(format!("{}:{chunks}", START + 1))
        );

        let reopened = manager_with(&store, &clock, config);
        assert!(reopened.load().await.unwrap());
        assert_eq!(reopened.snapshot().await, Some(named_products("second")));
    }

    #[test]
    fn test_chunk_manifest_parse() {
        assert_eq!(
            ChunkManifest::parse("1700000000000:3"),
            Some(ChunkManifest {
                generation: 1_700_000_000_000,
                count: 3
            })
        );
        assert_eq!(ChunkManifest::parse("3"), None);
        assert_eq!(ChunkManifest::parse("x:3"), None);
    }

    #[test]
    fn test_split_respects_utf8() {
        let value = "aé€😀b";
        let pieces = split_on_char_boundaries(value, 2);
        assert_eq!(pieces.concat(), value);
        assert!(pieces.iter().all(|p| !p.is_empty()));
    }
}
