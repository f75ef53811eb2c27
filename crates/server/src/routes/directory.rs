//! Primary directory routes: listing, detail, and the submission flow.

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Form, Router};
use serde::Deserialize;

use pwadir_core::directory::{self, normalize_manifest_url};
use pwadir_core::{Error, PwaRecord, SortOrder};

use super::{ViewParams, is_truthy, render};
use crate::AppState;
use crate::csp::Nonces;
use crate::error::AppError;
use crate::views::{self, Listing, Page, SubmitForm};

/// Records per listing page.
pub const LIST_PAGE_SIZE: u64 = 32;

/// Upper bound on a caller-supplied `limit`.
const MAX_LIST_LIMIT: u64 = 100;

const ADD_PAGE: Page<'static> = Page {
    title: "PWA Directory - Submit a PWA",
    description: "PWA Directory: Submit a Progressive Web App",
    backlink: true,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/add", get(add_form).post(submit))
        .route("/{id}", get(show))
}

/// Listing query string. Values are kept raw and parsed leniently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub sort: Option<String>,
    pub start: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "contentOnly")]
    pub content_only: Option<String>,
}

/// Leading digits of `value` as a positive integer; zero and garbage count as absent.
fn parse_positive(value: Option<&str>) -> Option<u64> {
    let digits: String = value?.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<u64>().ok().filter(|n| *n > 0)
}

/// Which slice of the directory a listing request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    pub page_number: u64,
    pub start: u64,
    pub limit: u64,
    /// Exclusive end of the page's nominal range.
    pub end: u64,
}

impl ListingWindow {
    pub fn from_params(params: &ListParams) -> Self {
        let page_number = parse_positive(params.page.as_deref()).unwrap_or(1);
        let start = parse_positive(params.start.as_deref()).unwrap_or((page_number - 1).saturating_mul(LIST_PAGE_SIZE));
        let limit = parse_positive(params.limit.as_deref())
            .unwrap_or(LIST_PAGE_SIZE)
            .min(MAX_LIST_LIMIT);
        Self { page_number, start, limit, end: page_number.saturating_mul(LIST_PAGE_SIZE) }
    }
}

async fn list(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Query(params): Query<ListParams>,
) -> Result<Html<String>, AppError> {
    let window = ListingWindow::from_params(&params);
    let sort = SortOrder::parse(params.sort.as_deref());

    let pwa_count = state.store.count().await?;
    let page = state.store.list(window.start, window.limit, sort).await?;

    let content = views::list_content(&Listing {
        pwas: &page.pwas,
        sort,
        page_number: window.page_number,
        has_next_page: page.has_more,
        pwa_count,
        start_pwa: window.start.saturating_add(1),
        end_pwa: pwa_count.min(window.end),
    });

    Ok(render(&Page::default(), &nonces, content, is_truthy(params.content_only.as_deref())))
}

fn submit_form(nonces: &Nonces, manifest_url: &str, error: Option<&str>, content_only: bool) -> Html<String> {
    let content = views::form_content(&SubmitForm {
        action: "/add",
        heading: "Submit a PWA",
        manifest_url,
        error,
        with_token: true,
    });
    render(&ADD_PAGE, nonces, content, content_only)
}

async fn add_form(Extension(nonces): Extension<Nonces>, Query(view): Query<ViewParams>) -> Html<String> {
    submit_form(&nonces, "", None, view.content_only())
}

/// Submission form body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Submission {
    #[serde(rename = "manifestUrl", default)]
    pub manifest_url: String,
    #[serde(rename = "idToken", default)]
    pub id_token: String,
}

/// Verify the submitter, resolve the manifest, and upsert its record.
async fn create_or_update_pwa(state: &AppState, manifest_url: &str, id_token: &str) -> Result<PwaRecord, Error> {
    let user = state.verifier.verify(id_token).await?;
    directory::validate_manifest_url(manifest_url)?;
    let manifest = state.fetcher.fetch(manifest_url).await?;
    directory::create_or_update(state.store.as_ref(), &manifest, Some(user)).await
}

async fn submit(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Query(view): Query<ViewParams>,
    Form(submission): Form<Submission>,
) -> Result<Response, AppError> {
    let manifest_url = normalize_manifest_url(&submission.manifest_url);
    let id_token = submission.id_token.trim();

    if manifest_url.is_empty() || id_token.is_empty() {
        let error = if manifest_url.is_empty() { "no manifest provided" } else { "user not logged in" };
        return Ok(submit_form(&nonces, &manifest_url, Some(error), view.content_only()).into_response());
    }

    match create_or_update_pwa(&state, &manifest_url, id_token).await {
        Ok(pwa) => {
            state.invalidate_pages().await;
            Ok(Redirect::to(&format!("/{}", pwa.id)).into_response())
        }
        Err(e) => match e.form_message() {
            Some(message) => {
                tracing::info!(manifest_url = %manifest_url, error = %e, "submission rejected");
                Ok(submit_form(&nonces, &manifest_url, Some(&message), view.content_only()).into_response())
            }
            None => Err(e.into()),
        },
    }
}

/// Raw manifest re-indented for display; kept as stored if it no longer parses.
pub(crate) fn pretty_manifest(pwa: &PwaRecord) -> String {
    pwa.manifest_json()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| pwa.manifest.clone())
}

async fn show(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Path(id): Path<String>,
    Query(view): Query<ViewParams>,
) -> Result<Html<String>, AppError> {
    let pwa = state.store.find(&id).await?;
    let report = state.store.find_latest_report(&id).await?;

    let name = pwa.display_name();
    let title = format!("PWA Directory: {name}");
    let description = format!("PWA Directory: {name} - {}", pwa.description.as_deref().unwrap_or_default());
    let page = Page { title: &title, description: &description, backlink: true };

    let content = views::detail_content(&pwa, report.as_ref(), &pretty_manifest(&pwa), None);
    Ok(render(&page, &nonces, content, view.content_only()))
}
