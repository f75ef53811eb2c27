//! Core types and shared functionality for the PWA directory.
//!
//! This crate provides:
//! - SQLite database handle with migrations
//! - Directory record and analysis report storage
//! - Page cache for rendered HTML
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod store;

pub use cache::{IndexUpdate, PageCache, PageCacheBackend};
pub use config::{AppConfig, ConfigError};
pub use db::Db;
pub use error::Error;
pub use hash::compute_pwa_id;
pub use manifest::Manifest;
pub use store::{AnalysisReport, PwaPage, PwaRecord, PwaStore, SortOrder, User};
