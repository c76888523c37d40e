//! Centralized error handling for the menu cache
//!
//! Each layer owns a `thiserror` enum and `AppError` aggregates them so the
//! service layer can use `?` across storage, remote and optimizer calls.
//!
//! # Error Categories
//!
//! - **Storage Errors**: persisted key/value failures (quota, IO, bad keys)
//! - **Remote Errors**: REST store connectivity and non-2xx responses
//! - **Optimizer Errors**: image decode/encode failures, single-flight guard
//! - **Cache Errors**: persisted cache reads and wipes
//!
//! # Usage
//!
//! ```rust
//! use menu_cache::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for storage Results
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience type alias for remote store Results
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Convenience type alias for optimizer Results
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Convenience type alias for cache Results
pub type CacheResult<T> = Result<T, CacheError>;
