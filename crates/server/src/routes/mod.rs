//! HTTP route handlers.
//!
//! `directory` serves the primary listing, detail and submission pages;
//! `legacy` serves the older `/pwas` CRUD surface when enabled.

pub mod directory;
pub mod legacy;

use axum::response::{Html, Response};
use serde::Deserialize;

use crate::csp::Nonces;
use crate::error;
use crate::views::{self, Page};

/// Query flag selecting a fragment-only render.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewParams {
    #[serde(rename = "contentOnly")]
    pub content_only: Option<String>,
}

impl ViewParams {
    pub fn content_only(&self) -> bool {
        is_truthy(self.content_only.as_deref())
    }
}

pub(crate) fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "1"))
}

/// Wrap `content` in the page layout unless a fragment was requested.
pub(crate) fn render(page: &Page<'_>, nonces: &Nonces, content: String, content_only: bool) -> Html<String> {
    if content_only { Html(content) } else { Html(views::document(page, nonces, &content)) }
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn fallback() -> Response {
    error::not_found()
}
