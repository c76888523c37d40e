use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, PersistOutcome};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Category, GalleryImage, MenuDocument, MenuRecord, Product, ProductTag, Restaurant,
};
use crate::optimizer::{
    BackupSummary, BatchImageOptimizer, OptimizationOptions, OptimizationReport, ProgressCallback,
    RestoreReport,
};
use crate::remote::{Collection, RemoteStore, decode_row, fetch_records};

pub struct MenuService {
    cache: Arc<CacheManager>,
    remote: Arc<dyn RemoteStore>,
    optimizer: Arc<BatchImageOptimizer>,
}

impl MenuService {
    pub fn new(
        cache: Arc<CacheManager>,
        remote: Arc<dyn RemoteStore>,
        optimizer: Arc<BatchImageOptimizer>,
    ) -> Self {
        Self {
            cache,
            remote,
            optimizer,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn optimizer(&self) -> &Arc<BatchImageOptimizer> {
        &self.optimizer
    }

    /// The menu document, from the cache when valid, else from the remote store
    pub async fn load(&self, force: bool) -> AppResult<MenuDocument> {
        if !force && let Some(document) = self.cache.get_cache().await {
            debug!("Serving menu from cache");
            return Ok(document);
        }

        info!("Loading menu from remote store");
        let document = self.fetch_document().await?;
        self.cache.set_cache(document.clone(), false).await;
        Ok(document)
    }

    async fn fetch_document(&self) -> AppResult<MenuDocument> {
        let remote = self.remote.as_ref();
        let (restaurants, categories, products, gallery_images, product_tags) = tokio::try_join!(
            fetch_records::<Restaurant>(remote, Collection::Restaurants),
            fetch_records::<Category>(remote, Collection::Categories),
            fetch_records::<Product>(remote, Collection::Products),
            fetch_records::<GalleryImage>(remote, Collection::GalleryImages),
            fetch_records::<ProductTag>(remote, Collection::ProductTags),
        )?;

        if restaurants.len() > 1 {
            warn!(
                "Remote store has {} restaurants, using the first",
                restaurants.len()
            );
        }

        info!(
            "Fetched menu: {} categories, {} products, {} gallery images, {} tags",
            categories.len(),
            products.len(),
            gallery_images.len(),
            product_tags.len()
        );

        Ok(MenuDocument {
            restaurant: restaurants.into_iter().next(),
            categories,
            products,
            gallery_images,
            product_tags,
        })
    }

    /// Insert or update a record, remote first, then the cache
    ///
    /// A record whose id is already in the document is updated; anything
    /// else is inserted. An empty id lets the remote store assign one.
    pub async fn save<T: MenuRecord>(&self, record: T) -> AppResult<T> {
        let mut document = self.load(false).await?;
        let exists = !record.id().is_empty()
            && T::records(&document).iter().any(|r| r.id() == record.id());

        let mut row = serde_json::to_value(&record)?;
        let stored = if exists {
            self.remote
                .update(T::COLLECTION, record.id(), row)
                .await?
        } else {
            if record.id().is_empty()
                && let Value::Object(map) = &mut row
            {
                map.remove("id");
            }
            self.remote.insert(T::COLLECTION, row).await?
        };
        let stored: T = decode_row(T::COLLECTION, stored)?;

        let records = T::records_mut(&mut document);
        match records.iter_mut().find(|r| r.id() == stored.id()) {
            Some(slot) => *slot = stored.clone(),
            None => records.push(stored.clone()),
        }
        self.commit(document).await;

        info!(
            "{} {} in {}",
            if exists { "Updated" } else { "Created" },
            stored.id(),
            T::COLLECTION
        );
        Ok(stored)
    }

    /// Delete a record, remote first, then the cache
    pub async fn delete<T: MenuRecord>(&self, id: &str) -> AppResult<()> {
        let mut document = self.load(false).await?;
        if !T::records(&document).iter().any(|r| r.id() == id) {
            return Err(AppError::not_found(T::COLLECTION.to_string(), id));
        }

        self.remote.delete(T::COLLECTION, id).await?;
        T::records_mut(&mut document).retain(|r| r.id() != id);
        self.commit(document).await;

        info!("Deleted {id} from {}", T::COLLECTION);
        Ok(())
    }

    pub async fn update_restaurant(&self, restaurant: Restaurant) -> AppResult<Restaurant> {
        let mut document = self.load(false).await?;
        let row = serde_json::to_value(&restaurant)?;

        let stored = match &document.restaurant {
            Some(current) => {
                self.remote
                    .update(Collection::Restaurants, &current.id, row)
                    .await?
            }
            None => self.remote.insert(Collection::Restaurants, row).await?,
        };
        let stored: Restaurant = decode_row(Collection::Restaurants, stored)?;

        document.restaurant = Some(stored.clone());
        self.commit(document).await;
        info!("Updated restaurant {}", stored.id);
        Ok(stored)
    }

    /// Optimize the inline images of the current document and cache the result
    pub async fn optimize_images(
        &self,
        options: &OptimizationOptions,
        progress: Option<&ProgressCallback>,
    ) -> AppResult<OptimizationReport> {
        let document = self.load(false).await?;
        let report = self
            .optimizer
            .optimize_all(&document, options, progress)
            .await?;

        if report.has_changes() {
            self.commit(report.document.clone()).await;
        } else {
            info!("No images changed, cache left as is");
        }
        Ok(report)
    }

    /// Put a backup's images back into the cached document
    pub async fn restore_images(&self, key: &str) -> AppResult<Option<RestoreReport>> {
        let mut document = self.load(false).await?;
        let Some(report) = self.optimizer.restore_from_backup(key, &mut document).await? else {
            return Ok(None);
        };
        if report.restored > 0 {
            self.commit(document).await;
        }
        Ok(Some(report))
    }

    pub async fn list_backups(&self) -> AppResult<Vec<BackupSummary>> {
        Ok(self.optimizer.available_backups().await?)
    }

    pub async fn delete_backup(&self, key: &str) -> AppResult<bool> {
        Ok(self.optimizer.delete_backup(key).await?)
    }

    pub async fn prune_backups(&self, keep: usize) -> AppResult<usize> {
        Ok(self.optimizer.prune_backups(keep).await?)
    }

    /// Drop the cache here and in every context sharing the store
    pub async fn invalidate(&self) -> AppResult<()> {
        Ok(self.cache.force_refresh().await?)
    }

    pub async fn logout(&self) -> AppResult<()> {
        Ok(self.cache.clear().await?)
    }

    /// Cache a locally mutated document and signal the change to peers
    async fn commit(&self, document: MenuDocument) -> PersistOutcome {
        let outcome = self.cache.set_cache(document, true).await;
        if !outcome.is_persisted() {
            warn!("Menu change is only held in memory until the next successful write");
        }
        outcome
    }
}
