pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod optimizer;
pub mod remote;
pub mod services;
pub mod storage;
pub mod utils;
