//! Batch image optimizer
//!
//! Finds every inline base64 image in the menu document, snapshots the
//! originals, re-encodes the oversized ones in small concurrent batches and
//! applies the replacements to a copy of the document once all batches are
//! done.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::backup::{BackupEntry, BackupSnapshot, BackupSummary, RestoreReport, parse_backup_key};
use super::compressor::{CompressionSettings, ImageCompressor, JpegCompressor};
use super::data_url::DataUrl;
use super::location::{ImageLocation, collect_images};
use crate::config::OptimizerConfig;
use crate::config::defaults::BACKUP_KEY_PREFIX;
use crate::errors::{OptimizerError, OptimizerResult};
use crate::models::MenuDocument;
use crate::storage::KeyValueStore;
use crate::utils::Clock;
use crate::utils::human_format::{format_bytes, format_duration};

/// Counters of a run, handed to the progress callback after every batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationProgress {
    pub total: usize,
    pub current: usize,
    pub optimized: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Bytes saved across optimized images
    pub savings: usize,
}

pub type ProgressCallback = dyn Fn(&OptimizationProgress) + Send + Sync;

/// Per-run overrides of the optimizer configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationOptions {
    pub create_backup: Option<bool>,
    pub max_concurrent: Option<usize>,
    pub skip_if_optimized: Option<bool>,
    pub target_bytes: Option<usize>,
}

impl OptimizationOptions {
    fn resolve(&self, base: &OptimizerConfig) -> OptimizerConfig {
        let mut config = base.clone();
        if let Some(create_backup) = self.create_backup {
            config.create_backup = create_backup;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent = max_concurrent.max(1);
        }
        if let Some(skip_if_optimized) = self.skip_if_optimized {
            config.skip_if_optimized = skip_if_optimized;
        }
        if let Some(target_bytes) = self.target_bytes {
            config.target_bytes = target_bytes;
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// At or below the skip threshold
    AlreadySmall,
    /// Re-encoding saved less than the minimum ratio
    InsufficientSavings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageChange {
    pub location: ImageLocation,
    pub original_size: usize,
    pub new_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub progress: OptimizationProgress,
    pub changes: Vec<ImageChange>,
    pub skipped: Vec<(ImageLocation, SkipReason)>,
    /// Key of the persisted snapshot, if one was written
    pub backup_key: Option<String>,
    /// Originals of every image considered, persisted or not
    pub snapshot: BackupSnapshot,
    /// Input document with all replacements applied
    pub document: MenuDocument,
    pub duration_ms: u64,
}

impl OptimizationReport {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

enum ImageOutcome {
    Optimized {
        data_url: String,
        original_size: usize,
        new_size: usize,
    },
    Skipped(SkipReason),
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> OptimizerResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| OptimizerError::already_running("image optimization"))?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BatchImageOptimizer {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    compressor: Arc<dyn ImageCompressor>,
    config: OptimizerConfig,
    running: AtomicBool,
}

impl BatchImageOptimizer {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: OptimizerConfig,
    ) -> Self {
        Self::with_compressor(store, clock, config, Arc::new(JpegCompressor))
    }

    pub fn with_compressor(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: OptimizerConfig,
        compressor: Arc<dyn ImageCompressor>,
    ) -> Self {
        Self {
            store,
            clock,
            compressor,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Optimize every oversized inline image of `doc`
    ///
    /// The input is left untouched; the optimized copy and the snapshot of
    /// the originals are returned in the report. Per-image failures are
    /// counted, not propagated.
    pub async fn optimize_all(
        &self,
        doc: &MenuDocument,
        options: &OptimizationOptions,
        progress_callback: Option<&ProgressCallback>,
    ) -> OptimizerResult<OptimizationReport> {
        let _guard = RunGuard::acquire(&self.running)?;
        let started = Instant::now();
        let config = options.resolve(&self.config);
        let settings = Arc::new(CompressionSettings::from(&config));

        let images = collect_images(doc);
        let snapshot = BackupSnapshot {
            timestamp: self.clock.now_ms(),
            images: images
                .iter()
                .map(|(location, data)| BackupEntry {
                    location: location.clone(),
                    original_size: super::data_url::decoded_len(data),
                    image_data: data.clone(),
                })
                .collect(),
        };
        info!("Found {} inline images to check", images.len());

        let mut progress = OptimizationProgress {
            total: images.len(),
            ..Default::default()
        };

        let backup_key = if config.create_backup && !images.is_empty() {
            match self.write_backup(&snapshot).await {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Failed to write image backup, continuing without one: {e}");
                    None
                }
            }
        } else {
            None
        };

        let mut staged: Vec<(ImageLocation, String)> = Vec::new();
        let mut changes = Vec::new();
        let mut skipped = Vec::new();
        let batch_size = config.max_concurrent.max(1);
        let batch_count = images.len().div_ceil(batch_size);

        for (batch_index, batch) in images.chunks(batch_size).enumerate() {
            let tasks = batch.iter().map(|(_, data)| {
                let compressor = Arc::clone(&self.compressor);
                let settings = Arc::clone(&settings);
                let data = data.clone();
                let skip_threshold = config
                    .skip_if_optimized
                    .then_some(config.skip_threshold_bytes);
                let min_savings_ratio = config.min_savings_ratio;
                tokio::task::spawn_blocking(move || {
                    process_image(
                        compressor.as_ref(),
                        &data,
                        &settings,
                        skip_threshold,
                        min_savings_ratio,
                    )
                })
            });
            let results = join_all(tasks).await;

            for ((location, _), result) in batch.iter().zip(results) {
                progress.current += 1;
                match result {
                    Ok(Ok(ImageOutcome::Optimized {
                        data_url,
                        original_size,
                        new_size,
                    })) => {
                        debug!(
                            "Optimized {location}: {} -> {}",
                            format_bytes(original_size as u64),
                            format_bytes(new_size as u64)
                        );
                        progress.optimized += 1;
                        progress.savings += original_size - new_size;
                        staged.push((location.clone(), data_url));
                        changes.push(ImageChange {
                            location: location.clone(),
                            original_size,
                            new_size,
                        });
                    }
                    Ok(Ok(ImageOutcome::Skipped(reason))) => {
                        debug!("Skipped {location}: {reason:?}");
                        progress.skipped += 1;
                        skipped.push((location.clone(), reason));
                    }
                    Ok(Err(e)) => {
                        warn!("Failed to optimize {location}: {e}");
                        progress.errors += 1;
                    }
                    Err(e) => {
                        error!("Compression task for {location} did not complete: {e}");
                        progress.errors += 1;
                    }
                }
            }

            if let Some(callback) = progress_callback {
                callback(&progress);
            }
            if batch_index + 1 < batch_count && !config.batch_delay.is_zero() {
                tokio::time::sleep(config.batch_delay).await;
            }
        }

        let mut document = doc.clone();
        for (location, data_url) in staged {
            if !location.write(&mut document, data_url) {
                warn!("Record for {location} disappeared before the replacement was applied");
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Image optimization finished in {}: {} optimized, {} skipped, {} errors, {} saved",
            format_duration(duration_ms),
            progress.optimized,
            progress.skipped,
            progress.errors,
            format_bytes(progress.savings as u64)
        );

        Ok(OptimizationReport {
            progress,
            changes,
            skipped,
            backup_key,
            snapshot,
            document,
            duration_ms,
        })
    }

    async fn write_backup(&self, snapshot: &BackupSnapshot) -> OptimizerResult<String> {
        let key = snapshot.key();
        let payload = serde_json::to_string(snapshot)?;
        self.store.set(&key, &payload).await?;
        info!(
            "Backed up {} images ({}) to {key}",
            snapshot.images.len(),
            format_bytes(snapshot.total_size() as u64)
        );
        Ok(key)
    }

    async fn read_backup(&self, key: &str) -> OptimizerResult<Option<BackupSnapshot>> {
        let Some(payload) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Backup {key} is malformed: {e}");
                Ok(None)
            }
        }
    }

    /// Every stored snapshot, newest first; malformed entries are skipped
    pub async fn available_backups(&self) -> OptimizerResult<Vec<BackupSummary>> {
        let mut backups = Vec::new();
        for key in self.store.keys_with_prefix(BACKUP_KEY_PREFIX).await? {
            if parse_backup_key(&key).is_none() {
                warn!("Ignoring backup with unexpected key {key}");
                continue;
            }
            if let Some(snapshot) = self.read_backup(&key).await? {
                backups.push(BackupSummary::from_snapshot(key, &snapshot));
            }
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.key.cmp(&a.key)));
        Ok(backups)
    }

    /// Put the images of a snapshot back into `doc`
    ///
    /// `Ok(None)` when the backup does not exist or cannot be read.
    pub async fn restore_from_backup(
        &self,
        key: &str,
        doc: &mut MenuDocument,
    ) -> OptimizerResult<Option<RestoreReport>> {
        let Some(snapshot) = self.read_backup(key).await? else {
            warn!("Backup {key} not found");
            return Ok(None);
        };

        let report = snapshot.apply(doc);
        info!(
            "Restored {} images from {key} ({} records missing)",
            report.restored,
            report.missing.len()
        );
        Ok(Some(report))
    }

    pub async fn delete_backup(&self, key: &str) -> OptimizerResult<bool> {
        if !key.starts_with(BACKUP_KEY_PREFIX) || self.store.get(key).await?.is_none() {
            return Ok(false);
        }
        self.store.remove(key).await?;
        info!("Deleted backup {key}");
        Ok(true)
    }

    /// Keep the newest `keep` snapshots; returns how many were deleted
    pub async fn prune_backups(&self, keep: usize) -> OptimizerResult<usize> {
        let backups = self.available_backups().await?;
        let mut deleted = 0;
        for backup in backups.iter().skip(keep) {
            self.store.remove(&backup.key).await?;
            deleted += 1;
        }
        if deleted > 0 {
            info!("Pruned {deleted} old image backups, kept {}", backups.len() - deleted);
        }
        Ok(deleted)
    }
}

/// Decode, check thresholds, compress; runs on the blocking pool
fn process_image(
    compressor: &dyn ImageCompressor,
    data: &str,
    settings: &CompressionSettings,
    skip_threshold: Option<usize>,
    min_savings_ratio: f64,
) -> OptimizerResult<ImageOutcome> {
    let original = DataUrl::parse(data)?;
    let original_size = original.len();

    if let Some(threshold) = skip_threshold
        && original_size <= threshold
    {
        return Ok(ImageOutcome::Skipped(SkipReason::AlreadySmall));
    }

    let compressed = compressor.compress(&original.data, settings)?;
    let new_size = compressed.bytes.len();
    let saved = original_size.saturating_sub(new_size);
    if original_size == 0 || (saved as f64 / original_size as f64) < min_savings_ratio || saved == 0
    {
        return Ok(ImageOutcome::Skipped(SkipReason::InsufficientSavings));
    }

    Ok(ImageOutcome::Optimized {
        data_url: DataUrl::new(compressed.mime_type, compressed.bytes).encode(),
        original_size,
        new_size,
    })
}
