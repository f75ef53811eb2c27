//! Directory record storage.
//!
//! [`PwaStore`] is the asynchronous contract route handlers depend on; the
//! SQLite-backed [`Db`](crate::Db) implements it. Every operation resolves to
//! a value or an explicit [`Error`].

pub mod pwas;
pub mod reports;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::db::Db;
use crate::hash::compute_pwa_id;
use crate::manifest::Manifest;

/// Reference to the user who submitted a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A directory entry for one web app manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwaRecord {
    pub id: String,
    pub manifest_url: String,
    /// Raw manifest JSON as fetched.
    pub manifest: String,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub start_url: Option<String>,
    pub icon_url: Option<String>,
    pub background_color: Option<String>,
    pub theme_color: Option<String>,
    pub user: Option<User>,
    /// Total score of the most recent analysis report.
    pub lighthouse_score: Option<i64>,
    pub created: String,
    pub updated: String,
}

impl PwaRecord {
    /// Build a fresh record from a fetched manifest.
    pub fn from_manifest(manifest: &Manifest, user: Option<User>, now: DateTime<Utc>) -> Self {
        let now = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            id: compute_pwa_id(&manifest.url),
            manifest_url: manifest.url.clone(),
            manifest: manifest.raw.clone(),
            name: manifest.name.clone(),
            short_name: manifest.short_name.clone(),
            description: manifest.description.clone(),
            start_url: manifest.start_url.clone(),
            icon_url: manifest.icon_url.clone(),
            background_color: manifest.background_color.clone(),
            theme_color: manifest.theme_color.clone(),
            user,
            lighthouse_score: None,
            created: now.clone(),
            updated: now,
        }
    }

    /// Name shown in listings and page titles.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.short_name.as_deref())
            .unwrap_or(&self.manifest_url)
    }

    /// Raw manifest parsed as JSON, if it still parses.
    pub fn manifest_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.manifest).ok()
    }
}

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Score,
}

impl SortOrder {
    /// Parse a query-string value; anything unrecognised is `Newest`.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("score") => SortOrder::Score,
            _ => SortOrder::Newest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Score => "score",
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct PwaPage {
    pub pwas: Vec<PwaRecord>,
    /// More records exist after this page.
    pub has_more: bool,
}

/// Result of an automated analysis run against a record.
///
/// Identified by record and calendar day, so a record has at most one report
/// per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: String,
    pub pwa_id: String,
    pub absolute_start_url: String,
    pub total_score: i64,
    /// Per-category score breakdown.
    pub scores: serde_json::Value,
    pub date: NaiveDate,
}

impl AnalysisReport {
    pub fn new(
        pwa_id: &str, absolute_start_url: &str, total_score: i64, scores: serde_json::Value, date: NaiveDate,
    ) -> Self {
        Self {
            id: format!("{pwa_id}-{}", date.format("%Y-%m-%d")),
            pwa_id: pwa_id.to_string(),
            absolute_start_url: absolute_start_url.to_string(),
            total_score,
            scores,
            date,
        }
    }
}

/// Storage contract for directory records and their analysis reports.
#[async_trait]
pub trait PwaStore: Send + Sync {
    /// Total number of records.
    async fn count(&self) -> Result<u64, Error>;

    /// A page of records starting at `start`.
    async fn list(&self, start: u64, limit: u64, sort: SortOrder) -> Result<PwaPage, Error>;

    /// Look up a record; `Error::NotFound` if absent.
    async fn find(&self, id: &str) -> Result<PwaRecord, Error>;

    /// Store a new record; `Error::AlreadyExists` if the identifier is taken.
    async fn insert(&self, pwa: &PwaRecord) -> Result<(), Error>;

    /// Replace an existing record; `Error::NotFound` if absent.
    async fn update(&self, pwa: &PwaRecord) -> Result<(), Error>;

    /// Remove a record; `Error::NotFound` if absent.
    async fn delete(&self, id: &str) -> Result<(), Error>;

    /// Store an analysis report unless one exists for the same record and day.
    ///
    /// Returns whether the report was stored. A stored report also becomes
    /// the record's `lighthouse_score`.
    async fn save_report(&self, report: &AnalysisReport) -> Result<bool, Error>;

    /// Most recent analysis report for a record.
    async fn find_latest_report(&self, pwa_id: &str) -> Result<Option<AnalysisReport>, Error>;
}

#[async_trait]
impl PwaStore for Db {
    async fn count(&self) -> Result<u64, Error> {
        self.count_pwas().await
    }

    async fn list(&self, start: u64, limit: u64, sort: SortOrder) -> Result<PwaPage, Error> {
        self.list_pwas(start, limit, sort).await
    }

    async fn find(&self, id: &str) -> Result<PwaRecord, Error> {
        self.find_pwa(id).await
    }

    async fn insert(&self, pwa: &PwaRecord) -> Result<(), Error> {
        self.insert_pwa(pwa).await
    }

    async fn update(&self, pwa: &PwaRecord) -> Result<(), Error> {
        self.update_pwa(pwa).await
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.delete_pwa(id).await
    }

    async fn save_report(&self, report: &AnalysisReport) -> Result<bool, Error> {
        self.store_report(report).await
    }

    async fn find_latest_report(&self, pwa_id: &str) -> Result<Option<AnalysisReport>, Error> {
        self.latest_report(pwa_id).await
    }
}
