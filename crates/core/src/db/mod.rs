//! SQLite persistence for directory records, analysis reports and cached pages.
//!
//! A single database file backs every store in the directory. Access goes
//! through tokio-rusqlite, which runs statements on a background thread:
//!
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod migrations;

pub use connection::Db;
