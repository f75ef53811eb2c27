//! Parsed web app manifest.

use serde::{Deserialize, Serialize};

/// A fetched and validated web app manifest.
///
/// `raw` keeps the manifest exactly as served; the other fields are the
/// normalized values the directory displays. URLs are absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// URL the manifest was fetched from.
    pub url: String,
    pub raw: String,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub start_url: Option<String>,
    pub icon_url: Option<String>,
    pub background_color: Option<String>,
    pub theme_color: Option<String>,
}

impl Manifest {
    /// Name shown in listings: `name`, falling back to `short_name`.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.short_name.as_deref())
    }
}
