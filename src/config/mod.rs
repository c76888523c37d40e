use anyhow::{Result, anyhow};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Environment variable prefix for overrides, e.g. `MENU_CACHE_CACHE__TTL=10m`
pub const ENV_PREFIX: &str = "MENU_CACHE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Which key/value backend persists the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// One file per key under `storage.path`
    File,
    /// Process-local map, nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Per-value quota; writes above it fail with `QuotaExceeded`
    #[serde(default)]
    pub max_value_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which the cached document is considered stale
    #[serde(default = "default_cache_ttl", with = "duration_serde::duration")]
    pub ttl: Duration,
    /// Serialized documents above this size are persisted in chunks
    #[serde(default = "default_max_persist_bytes")]
    pub max_persist_bytes: usize,
    /// Schema tag; a persisted cache with a different tag is wiped on load
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// JPEG quality of the first attempt (0.0-1.0)
    #[serde(default = "default_initial_quality")]
    pub initial_quality: f32,
    #[serde(default = "default_quality_step")]
    pub quality_step: f32,
    /// The quality search stops once it reaches this value
    #[serde(default = "default_min_quality")]
    pub min_quality: f32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// The quality search stops once the output is at most this size
    #[serde(default = "default_target_bytes")]
    pub target_bytes: usize,
    /// Images at or below this size are left alone when `skip_if_optimized`
    #[serde(default = "default_skip_threshold_bytes")]
    pub skip_threshold_bytes: usize,
    /// Results saving less than this fraction of the original are discarded
    #[serde(default = "default_min_savings_ratio")]
    pub min_savings_ratio: f64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_batch_delay", with = "duration_serde::duration")]
    pub batch_delay: Duration,
    #[serde(default = "default_create_backup")]
    pub create_backup: bool,
    #[serde(default = "default_skip_if_optimized")]
    pub skip_if_optimized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    /// Sent as both `apikey` and `Authorization: Bearer`
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_remote_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

// Storage defaults
fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

// Cache defaults
fn default_cache_ttl() -> Duration {
    humantime::parse_duration(DEFAULT_CACHE_TTL).unwrap_or(Duration::from_secs(300))
}

fn default_max_persist_bytes() -> usize {
    DEFAULT_MAX_PERSIST_BYTES
}

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

// Optimizer defaults
fn default_max_width() -> u32 {
    DEFAULT_MAX_WIDTH
}

fn default_max_height() -> u32 {
    DEFAULT_MAX_HEIGHT
}

fn default_initial_quality() -> f32 {
    DEFAULT_INITIAL_QUALITY
}

fn default_quality_step() -> f32 {
    DEFAULT_QUALITY_STEP
}

fn default_min_quality() -> f32 {
    DEFAULT_MIN_QUALITY
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_target_bytes() -> usize {
    DEFAULT_TARGET_BYTES
}

fn default_skip_threshold_bytes() -> usize {
    DEFAULT_SKIP_THRESHOLD_BYTES
}

fn default_min_savings_ratio() -> f64 {
    DEFAULT_MIN_SAVINGS_RATIO
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_batch_delay() -> Duration {
    humantime::parse_duration(DEFAULT_BATCH_DELAY).unwrap_or(Duration::from_millis(100))
}

fn default_create_backup() -> bool {
    DEFAULT_CREATE_BACKUP
}

fn default_skip_if_optimized() -> bool {
    DEFAULT_SKIP_IF_OPTIMIZED
}

// Remote defaults
fn default_remote_base_url() -> String {
    DEFAULT_REMOTE_BASE_URL.to_string()
}

fn default_remote_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_REMOTE_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
            max_value_bytes: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            max_persist_bytes: default_max_persist_bytes(),
            schema_version: default_schema_version(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            initial_quality: default_initial_quality(),
            quality_step: default_quality_step(),
            min_quality: default_min_quality(),
            max_attempts: default_max_attempts(),
            target_bytes: default_target_bytes(),
            skip_threshold_bytes: default_skip_threshold_bytes(),
            min_savings_ratio: default_min_savings_ratio(),
            max_concurrent: default_max_concurrent(),
            batch_delay: default_batch_delay(),
            create_backup: default_create_backup(),
            skip_if_optimized: default_skip_if_optimized(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            api_key: None,
            timeout: default_remote_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            optimizer: OptimizerConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Validate that the cache can persist anything at all
    pub fn validate(&self) -> Result<(), String> {
        if self.max_persist_bytes == 0 {
            return Err("cache.max_persist_bytes must be greater than 0".to_string());
        }
        if self.schema_version.trim().is_empty() {
            return Err("cache.schema_version must not be empty".to_string());
        }
        Ok(())
    }
}

impl OptimizerConfig {
    /// Validate quality bounds and batch sizing
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("optimizer.max_concurrent must be at least 1".to_string());
        }
        if self.max_attempts == 0 {
            return Err("optimizer.max_attempts must be at least 1".to_string());
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err("optimizer.max_width and max_height must be non-zero".to_string());
        }
        for (name, value) in [
            ("initial_quality", self.initial_quality),
            ("min_quality", self.min_quality),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!(
                    "optimizer.{name} must be within (0.0, 1.0], got {value}"
                ));
            }
        }
        if self.min_quality > self.initial_quality {
            return Err(format!(
                "optimizer.min_quality ({}) exceeds initial_quality ({})",
                self.min_quality, self.initial_quality
            ));
        }
        if self.quality_step <= 0.0 {
            return Err("optimizer.quality_step must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.min_savings_ratio) {
            return Err(format!(
                "optimizer.min_savings_ratio must be within [0.0, 1.0), got {}",
                self.min_savings_ratio
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;
        self.optimizer.validate()?;
        url::Url::parse(&self.remote.base_url)
            .map_err(|e| format!("remote.base_url '{}' is invalid: {e}", self.remote.base_url))?;
        Ok(())
    }

    /// Layer defaults, the TOML file (when present) and `MENU_CACHE_*` env vars
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let config_file = config_file.as_ref();
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| {
                anyhow!(
                    "Failed to load configuration from {}: {e}",
                    config_file.display()
                )
            })?;

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Write the default configuration as TOML, refusing to clobber an existing file
    pub fn write_default<P: AsRef<Path>>(config_file: P) -> Result<()> {
        let config_file = config_file.as_ref();
        if config_file.exists() {
            return Err(anyhow!(
                "Refusing to overwrite existing config file: {}",
                config_file.display()
            ));
        }
        let contents = toml::to_string_pretty(&Self::default())?;
        std::fs::write(config_file, contents)?;
        info!("Created default config file: {}", config_file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_persist_bytes, 4_000_000);
        assert_eq!(config.cache.schema_version, "2.2");
        assert_eq!(config.optimizer.max_concurrent, 2);
        assert_eq!(config.optimizer.batch_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_optimizer_validation() {
        let mut optimizer = OptimizerConfig::default();
        optimizer.max_concurrent = 0;
        assert!(optimizer.validate().is_err());

        let mut optimizer = OptimizerConfig::default();
        optimizer.min_quality = 0.9;
        assert!(optimizer.validate().is_err());

        let mut optimizer = OptimizerConfig::default();
        optimizer.initial_quality = 1.5;
        assert!(optimizer.validate().is_err());
    }

    #[test]
    fn test_load_from_file_merges_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu-cache.toml");
        std::fs::write(
            &path,
            r#"
[cache]
ttl = "10m"

[optimizer]
max_concurrent = 4
create_backup = false
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert_eq!(config.cache.schema_version, "2.2");
        assert_eq!(config.optimizer.max_concurrent, 4);
        assert!(!config.optimizer.create_backup);
        assert_eq!(config.optimizer.max_width, 800);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu-cache.toml");
        Config::write_default(&path).unwrap();
        assert!(Config::write_default(&path).is_err());

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.optimizer.target_bytes, 200 * 1024);
    }
}
