//! Inline image optimization
//!
//! Menu records may carry images as `data:image/...;base64,` URLs. These
//! inflate the cached document well past what the store accepts, so the
//! optimizer re-encodes the oversized ones and keeps a snapshot of the
//! originals for rollback.

pub mod backup;
pub mod compressor;
pub mod data_url;
pub mod location;
pub mod service;

pub use backup::{BackupEntry, BackupSnapshot, BackupSummary, RestoreReport};
pub use compressor::{CompressedImage, CompressionSettings, ImageCompressor, JpegCompressor};
pub use data_url::{DataUrl, is_base64_image};
pub use location::{ImageLocation, collect_images, strip_base64_images};
pub use service::{
    BatchImageOptimizer, ImageChange, OptimizationOptions, OptimizationProgress,
    OptimizationReport, ProgressCallback, SkipReason,
};
