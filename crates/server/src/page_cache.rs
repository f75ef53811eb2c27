//! Page cache middleware.
//!
//! Anonymous `GET` requests are served through [`PageCache::get_or_render`]
//! keyed by path and query. Only `200 OK` HTML bodies are stored. Nonces from
//! the CSP layer are swapped for placeholders before storing and filled in
//! with the current request's nonces on the way out, so a cached body always
//! matches the policy header it is sent with.
//!
//! [`PageCache::get_or_render`]: pwadir_core::PageCache::get_or_render

use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};

use crate::AppState;
use crate::csp::Nonces;

/// Response header reporting `hit` or `miss` for cacheable requests.
pub const CACHE_STATUS_HEADER: &str = "x-page-cache";

const FIRST_NONCE_PLACEHOLDER: &str = "__CSP_NONCE_1__";
const SECOND_NONCE_PLACEHOLDER: &str = "__CSP_NONCE_2__";

fn is_cacheable(state: &AppState, request: &Request) -> bool {
    state.config.cache_enabled
        && request.method() == Method::GET
        && !request.headers().contains_key(header::AUTHORIZATION)
}

fn cache_key(request: &Request) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

fn to_placeholders(body: &str, nonces: Option<&Nonces>) -> String {
    match nonces {
        Some(n) => body
            .replace(&n.first, FIRST_NONCE_PLACEHOLDER)
            .replace(&n.second, SECOND_NONCE_PLACEHOLDER),
        None => body.to_string(),
    }
}

fn from_placeholders(body: &str, nonces: Option<&Nonces>) -> String {
    match nonces {
        Some(n) => body
            .replace(FIRST_NONCE_PLACEHOLDER, &n.first)
            .replace(SECOND_NONCE_PLACEHOLDER, &n.second),
        None => body.to_string(),
    }
}

/// Run the handler and return its body if it may be cached, else the response itself.
async fn render(request: Request, next: Next, nonces: Option<&Nonces>) -> Result<String, Response> {
    let response = next.run(request).await;
    if response.status() != StatusCode::OK || !is_html(&response) {
        return Err(response);
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to read rendered page");
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    match String::from_utf8(bytes.to_vec()) {
        Ok(body) => Ok(to_placeholders(&body, nonces)),
        Err(_) => Err(Response::from_parts(parts, Body::from(bytes))),
    }
}

/// Cache-aside for rendered pages.
pub async fn cache_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !is_cacheable(&state, &request) {
        return next.run(request).await;
    }

    let key = cache_key(&request);
    let nonces = request.extensions().get::<Nonces>().cloned();
    let rendered = AtomicBool::new(false);

    let result = state
        .cache
        .get_or_render(&key, || async {
            rendered.store(true, Ordering::Relaxed);
            render(request, next, nonces.as_ref()).await
        })
        .await;

    match result {
        Ok(body) => {
            let status = if rendered.load(Ordering::Relaxed) { "miss" } else { "hit" };
            let mut response = Html(from_placeholders(&body, nonces.as_ref())).into_response();
            response.headers_mut().insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
            response
        }
        Err(response) => response,
    }
}
