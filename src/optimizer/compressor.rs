//! Re-encoding of oversized images

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::fmt::Debug;
use tracing::debug;

use crate::config::OptimizerConfig;
use crate::errors::OptimizerResult;

/// Bounds for one compression run
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub initial_quality: f32,
    pub quality_step: f32,
    pub min_quality: f32,
    pub max_attempts: u32,
    pub target_bytes: usize,
}

impl From<&OptimizerConfig> for CompressionSettings {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            max_width: config.max_width,
            max_height: config.max_height,
            initial_quality: config.initial_quality,
            quality_step: config.quality_step,
            min_quality: config.min_quality,
            max_attempts: config.max_attempts,
            target_bytes: config.target_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// Quality of the kept attempt
    pub quality: f32,
    pub attempts: u32,
}

/// Turns decoded image bytes into a smaller encoding
///
/// Implementations are CPU bound and called from the blocking pool.
pub trait ImageCompressor: Send + Sync + Debug {
    fn compress(
        &self,
        bytes: &[u8],
        settings: &CompressionSettings,
    ) -> OptimizerResult<CompressedImage>;
}

/// Resize into the bounding box, then search JPEG quality downwards
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCompressor;

impl JpegCompressor {
    /// Fit inside the bounds keeping the aspect ratio; never upscale
    fn fit(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        if width <= max_width && height <= max_height {
            return image;
        }
        image.resize(max_width, max_height, FilterType::Lanczos3)
    }

    fn encode(image: &image::RgbImage, quality: f32) -> OptimizerResult<Vec<u8>> {
        let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
        Ok(buffer)
    }
}

impl ImageCompressor for JpegCompressor {
    fn compress(
        &self,
        bytes: &[u8],
        settings: &CompressionSettings,
    ) -> OptimizerResult<CompressedImage> {
        let decoded = image::load_from_memory(bytes)?;
        let (original_width, original_height) = decoded.dimensions();
        let resized = Self::fit(decoded, settings.max_width, settings.max_height);
        let (width, height) = resized.dimensions();
        // JPEG has no alpha channel
        let rgb = resized.to_rgb8();

        let mut quality = settings.initial_quality;
        let mut attempts = 0;
        let mut encoded = Vec::new();
        let mut kept_quality = quality;

        while attempts < settings.max_attempts.max(1) {
            attempts += 1;
            encoded = Self::encode(&rgb, quality)?;
            kept_quality = quality;

            if encoded.len() <= settings.target_bytes
                || quality <= settings.min_quality + f32::EPSILON
            {
                break;
            }
            quality = (quality - settings.quality_step).max(settings.min_quality);
        }

        debug!(
            "Compressed {}x{} -> {}x{}: {} -> {} bytes (quality {:.2}, {} attempts)",
            original_width,
            original_height,
            width,
            height,
            bytes.len(),
            encoded.len(),
            kept_quality,
            attempts
        );

        Ok(CompressedImage {
            bytes: encoded,
            mime_type: "image/jpeg".to_string(),
            width,
            height,
            quality: kept_quality,
            attempts,
        })
    }
}
