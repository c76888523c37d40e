/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Storage defaults
pub const DEFAULT_STORAGE_PATH: &str = "./data/menu-cache";

// Cache defaults
pub const DEFAULT_CACHE_TTL: &str = "5m";
pub const DEFAULT_MAX_PERSIST_BYTES: usize = 4_000_000;
pub const DEFAULT_SCHEMA_VERSION: &str = "2.2";

// Persisted keys
pub const CACHE_KEY: &str = "menu_admin_cache";
pub const CACHE_TIMESTAMP_KEY: &str = "menu_admin_cache_timestamp";
pub const CACHE_VERSION_KEY: &str = "menu_admin_cache_version";
pub const LAST_MODIFIED_KEY: &str = "menu_admin_last_modified";
pub const CACHE_CHUNK_COUNT_KEY: &str = "menu_admin_cache_chunks";
pub const CACHE_CHUNK_KEY_PREFIX: &str = "menu_admin_cache_chunk_";
pub const BACKUP_KEY_PREFIX: &str = "imageBackup_";

// Optimizer defaults
pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_MAX_HEIGHT: u32 = 600;
pub const DEFAULT_INITIAL_QUALITY: f32 = 0.8;
pub const DEFAULT_QUALITY_STEP: f32 = 0.1;
pub const DEFAULT_MIN_QUALITY: f32 = 0.3;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TARGET_BYTES: usize = 200 * 1024;
pub const DEFAULT_SKIP_THRESHOLD_BYTES: usize = 300 * 1024;
pub const DEFAULT_MIN_SAVINGS_RATIO: f64 = 0.10;
pub const DEFAULT_MAX_CONCURRENT: usize = 2;
pub const DEFAULT_BATCH_DELAY: &str = "100ms";
pub const DEFAULT_CREATE_BACKUP: bool = true;
pub const DEFAULT_SKIP_IF_OPTIMIZED: bool = true;

// Remote store defaults
pub const DEFAULT_REMOTE_BASE_URL: &str = "http://localhost:54321";
pub const DEFAULT_REMOTE_TIMEOUT: &str = "30s";
