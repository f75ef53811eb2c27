//! Legacy CRUD routes under `/pwas`.
//!
//! Submissions here carry no identity token and records are created without an
//! owner. Listings page with an opaque `pageToken` rather than page numbers.

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Form, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use pwadir_client::fetch::canonicalize;
use pwadir_core::directory::{self, normalize_manifest_url};
use pwadir_core::{Error, PwaRecord, SortOrder, compute_pwa_id};

use super::directory::pretty_manifest;
use super::render;
use crate::AppState;
use crate::csp::Nonces;
use crate::error::{self, AppError};
use crate::views::{self, Page, RecordActions, SubmitForm};

/// Records per legacy listing page.
pub const LEGACY_PAGE_SIZE: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pwas", get(list))
        .route("/pwas/add", get(add_form).post(add))
        .route("/pwas/{id}", get(show))
        .route("/pwas/{id}/edit", get(edit_form).post(edit))
        .route("/pwas/{id}/delete", get(delete))
}

/// Encode a listing offset as a page token.
pub fn encode_page_token(offset: u64) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decode a page token; anything unreadable starts from the beginning.
pub fn decode_page_token(token: Option<&str>) -> u64 {
    token
        .and_then(|t| URL_SAFE_NO_PAD.decode(t.trim()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "pageToken")]
    pub page_token: Option<String>,
}

/// Legacy form body. Only the manifest URL is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacySubmission {
    #[serde(rename = "manifestUrl", default)]
    pub manifest_url: String,
}

async fn list(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Query(params): Query<ListParams>,
) -> Result<Html<String>, AppError> {
    let offset = decode_page_token(params.page_token.as_deref());
    let page = state.store.list(offset, LEGACY_PAGE_SIZE, SortOrder::Newest).await?;

    let next_page_token = page
        .has_more
        .then(|| encode_page_token(offset + page.pwas.len() as u64));
    let content = views::legacy_list_content(&page.pwas, next_page_token.as_deref());
    Ok(render(&Page::default(), &nonces, content, false))
}

fn legacy_form(nonces: &Nonces, action: &str, heading: &str, manifest_url: &str, error: Option<&str>) -> Html<String> {
    let content = views::form_content(&SubmitForm { action, heading, manifest_url, error, with_token: false });
    render(&Page { backlink: true, ..Default::default() }, nonces, content, false)
}

async fn add_form(Extension(nonces): Extension<Nonces>) -> Html<String> {
    legacy_form(&nonces, "/pwas/add", "Add PWA", "", None)
}

async fn create_pwa(state: &AppState, manifest_url: &str) -> Result<PwaRecord, Error> {
    directory::validate_manifest_url(manifest_url)?;

    // Refuse before fetching anything. Records are keyed by the URL the fetcher canonicalizes to.
    let canonical = canonicalize(manifest_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let id = compute_pwa_id(canonical.as_str());
    match state.store.find(&id).await {
        Ok(_) => return Err(Error::AlreadyExists(id)),
        Err(Error::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let manifest = state.fetcher.fetch(manifest_url).await?;
    directory::create(state.store.as_ref(), &manifest).await
}

async fn add(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Form(submission): Form<LegacySubmission>,
) -> Result<Response, AppError> {
    let manifest_url = normalize_manifest_url(&submission.manifest_url);

    match create_pwa(&state, &manifest_url).await {
        Ok(pwa) => {
            state.invalidate_pages().await;
            Ok(Redirect::to(&format!("/pwas/{}", pwa.id)).into_response())
        }
        Err(e) => match e.form_message() {
            Some(message) => {
                Ok(legacy_form(&nonces, "/pwas/add", "Add PWA", &submission.manifest_url, Some(&message)).into_response())
            }
            None => Err(e.into()),
        },
    }
}

async fn show(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Path(id): Path<String>,
) -> Result<Response, AppError> {
    let pwa = match state.store.find(&id).await {
        Ok(pwa) => pwa,
        Err(Error::NotFound(_)) => return Ok(error::not_found()),
        Err(e) => return Err(e.into()),
    };

    let edit = format!("/pwas/{id}/edit");
    let delete = format!("/pwas/{id}/delete");
    let content = views::detail_content(
        &pwa,
        None,
        &pretty_manifest(&pwa),
        Some(RecordActions { edit: &edit, delete: &delete }),
    );
    let title = format!("PWA Directory: {}", pwa.display_name());
    let page = Page { title: &title, backlink: true, ..Default::default() };
    Ok(render(&page, &nonces, content, false).into_response())
}

async fn edit_form(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let pwa = state.store.find(&id).await?;
    Ok(legacy_form(&nonces, &format!("/pwas/{id}/edit"), "Edit PWA", &pwa.manifest_url, None))
}

async fn refresh_pwa(state: &AppState, id: &str, manifest_url: &str) -> Result<PwaRecord, Error> {
    directory::validate_manifest_url(manifest_url)?;
    let manifest = state.fetcher.fetch(manifest_url).await?;
    directory::refresh(state.store.as_ref(), id, &manifest).await
}

async fn edit(
    State(state): State<AppState>, Extension(nonces): Extension<Nonces>, Path(id): Path<String>,
    Form(submission): Form<LegacySubmission>,
) -> Result<Response, AppError> {
    let manifest_url = normalize_manifest_url(&submission.manifest_url);

    match refresh_pwa(&state, &id, &manifest_url).await {
        Ok(pwa) => {
            state.invalidate_pages().await;
            Ok(Redirect::to(&format!("/pwas/{}", pwa.id)).into_response())
        }
        Err(e) => match e.form_message() {
            Some(message) => Ok(legacy_form(
                &nonces,
                &format!("/pwas/{id}/edit"),
                "Edit PWA",
                &submission.manifest_url,
                Some(&message),
            )
            .into_response()),
            None => Err(e.into()),
        },
    }
}

async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<Redirect, AppError> {
    state.store.delete(&id).await?;
    tracing::info!(id = %id, "deleted directory record");
    state.invalidate_pages().await;
    Ok(Redirect::to("/pwas"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_token() {
        assert_eq!(decode_page_token(Some(&encode_page_token(30))), 30);
        assert_eq!(decode_page_token(None), 0);
        assert_eq!(decode_page_token(Some("!!not base64!!")), 0);
        assert_eq!(decode_page_token(Some(&URL_SAFE_NO_PAD.encode("ten"))), 0);
    }
}
