//! Service layer
//!
//! `MenuService` is the single entry point callers use for menu data. It
//! serves reads from the cache, falls back to the remote store on a miss,
//! and writes through the remote store before updating the cache.
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = MenuService::new(cache, remote, optimizer);
//! let menu = service.load(false).await?;
//! service.save(product).await?;
//! ```

pub mod menu;

pub use menu::MenuService;
