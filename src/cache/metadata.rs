use serde::{Deserialize, Serialize};
use std::fmt;

/// What a `set_cache` call managed to persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PersistOutcome {
    /// Whole document under the document key
    Full { bytes: usize },
    /// Document split across chunk keys
    Chunked { chunks: usize, bytes: usize },
    /// Full payload failed; persisted with base64 image fields emptied
    Reduced { stripped_images: usize, bytes: usize },
    /// Nothing persisted; the document only lives in memory
    MemoryOnly,
}

impl PersistOutcome {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::MemoryOnly)
    }

    pub fn bytes(&self) -> usize {
        match self {
            Self::Full { bytes } | Self::Chunked { bytes, .. } | Self::Reduced { bytes, .. } => {
                *bytes
            }
            Self::MemoryOnly => 0,
        }
    }
}

impl fmt::Display for PersistOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { bytes } => write!(f, "full ({bytes} bytes)"),
            Self::Chunked { chunks, bytes } => write!(f, "chunked ({chunks} chunks, {bytes} bytes)"),
            Self::Reduced {
                stripped_images,
                bytes,
            } => write!(
                f,
                "reduced ({stripped_images} images stripped, {bytes} bytes)"
            ),
            Self::MemoryOnly => f.write_str("memory only"),
        }
    }
}

/// Freshness guards of the cached document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Epoch ms of the last local write
    pub timestamp: Option<i64>,
    pub version: String,
    /// Epoch ms of the last mutation by any context sharing the store
    pub last_modified: Option<i64>,
    /// `now - timestamp`, when there is a timestamp
    pub age_ms: Option<i64>,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub last_outcome: Option<PersistOutcome>,
}

impl CacheStats {
    pub(crate) fn new(hits: u64, misses: u64, last_outcome: Option<PersistOutcome>) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        Self {
            hits,
            misses,
            hit_rate,
            last_outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::new(0, 0, None).hit_rate, 0.0);
        assert_eq!(CacheStats::new(3, 1, None).hit_rate, 0.75);
    }

    #[test]
    fn test_outcome_display_and_bytes() {
        let outcome = PersistOutcome::Reduced {
            stripped_images: 2,
            bytes: 100,
        };
        assert_eq!(outcome.to_string(), "reduced (2 images stripped, 100 bytes)");
        assert_eq!(outcome.bytes(), 100);
        assert!(!PersistOutcome::MemoryOnly.is_persisted());
    }
}
