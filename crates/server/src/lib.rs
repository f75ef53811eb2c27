//! HTTP application for the PWA directory.
//!
//! [`app`] assembles the router: directory routes (plus the legacy `/pwas`
//! routes when enabled) behind the page cache, the CSP layer, and request
//! tracing.

pub mod csp;
pub mod error;
pub mod logging;
pub mod page_cache;
pub mod routes;
pub mod server;
pub mod views;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use pwadir_client::{IdentityVerifier, ManifestFetcher};
use pwadir_core::{AppConfig, PageCache, PwaStore};

/// Largest accepted request body. Forms carry a URL and a token.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Shared dependencies of every handler, constructed once per process.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PwaStore>,
    pub cache: PageCache,
    pub fetcher: Arc<dyn ManifestFetcher>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Drop every cached page after a record changes.
    ///
    /// Failures are logged; the write itself has already succeeded.
    pub async fn invalidate_pages(&self) {
        match self.cache.invalidate_all().await {
            Ok(deleted) => tracing::debug!(deleted, "invalidated cached pages"),
            Err(e) => tracing::warn!(error = %e, "failed to invalidate cached pages"),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let mut router = routes::directory::router();
    if state.config.legacy_routes {
        router = router.merge(routes::legacy::router());
    }

    let trace = TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
        tracing::info_span!("http.request", method = %request.method(), uri = %request.uri())
    });

    router
        .route("/healthz", get(routes::healthz))
        .fallback(routes::fallback)
        .layer(middleware::from_fn_with_state(state.clone(), page_cache::cache_pages))
        .layer(middleware::from_fn(csp::content_security_policy))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(trace)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use pwadir_core::{Db, Error, Manifest, User, compute_pwa_id};
    use scraper::{Html, Selector};
    use tower::ServiceExt;

    use crate::page_cache::CACHE_STATUS_HEADER;

    const VALID_TOKEN: &str = "valid-token";

    /// Returns a fixed manifest for any URL and records what was requested.
    #[derive(Default)]
    struct FakeFetcher {
        requested: Mutex<Vec<String>>,
        fail: bool,
    }

    impl FakeFetcher {
        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ManifestFetcher for FakeFetcher {
        async fn fetch(&self, manifest_url: &str) -> Result<Manifest, Error> {
            self.requested.lock().unwrap().push(manifest_url.to_string());
            if self.fail {
                return Err(Error::HttpError("status 404".into()));
            }
            Ok(Manifest {
                url: manifest_url.to_string(),
                raw: r#"{"name":"Fake App","start_url":"/"}"#.to_string(),
                name: Some("Fake App".into()),
                short_name: None,
                description: Some("A fake app".into()),
                start_url: Some("https://example.com/".into()),
                icon_url: None,
                background_color: None,
                theme_color: None,
            })
        }
    }

    struct FakeVerifier;

    #[async_trait]
    impl IdentityVerifier for FakeVerifier {
        async fn verify(&self, token: &str) -> Result<User, Error> {
            if token == VALID_TOKEN {
                Ok(User { id: "user-1".into(), name: Some("Test User".into()), email: None })
            } else {
                Err(Error::NotLoggedIn("bad token".into()))
            }
        }
    }

    struct Harness {
        app: Router,
        db: Db,
        cache: PageCache,
        fetcher: Arc<FakeFetcher>,
    }

    async fn harness_with(legacy_routes: bool, fetcher: FakeFetcher) -> Harness {
        let db = Db::open_in_memory().await.unwrap();
        let cache = PageCache::new(Arc::new(db.clone()), 3600);
        let fetcher = Arc::new(fetcher);
        let config = AppConfig { legacy_routes, ..Default::default() };

        let state = AppState {
            store: Arc::new(db.clone()),
            cache: cache.clone(),
            fetcher: fetcher.clone(),
            verifier: Arc::new(FakeVerifier),
            config: Arc::new(config),
        };

        Harness { app: app(state), db, cache, fetcher }
    }

    async fn harness() -> Harness {
        harness_with(false, FakeFetcher::default()).await
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_form(app: &Router, uri: &str, body: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn error_message(html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let selector = Selector::parse("p.error").unwrap();
        doc.select(&selector).next().map(|e| e.text().collect())
    }

    async fn index_contains(cache: &PageCache, key: &str) -> bool {
        for _ in 0..50 {
            if cache.keys().await.unwrap().iter().any(|k| k == key) {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_listing_is_cached_under_root() {
        let h = harness().await;

        let first = get(&h.app, "/").await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(header_str(&first, CACHE_STATUS_HEADER), Some("miss"));
        assert!(h.cache.get("/").await.is_ok());
        assert!(index_contains(&h.cache, "/").await);

        let second = get(&h.app, "/").await;
        assert_eq!(header_str(&second, CACHE_STATUS_HEADER), Some("hit"));
    }

    #[tokio::test]
    async fn test_cached_page_carries_current_nonces() {
        let h = harness().await;
        get(&h.app, "/add").await;

        let response = get(&h.app, "/add").await;
        assert_eq!(header_str(&response, CACHE_STATUS_HEADER), Some("hit"));
        let policy = header_str(&response, "content-security-policy").unwrap().to_string();
        let html = body_text(response).await;

        let doc = Html::parse_document(&html);
        let selector = Selector::parse("script[nonce]").unwrap();
        let nonces: Vec<_> = doc.select(&selector).filter_map(|s| s.value().attr("nonce")).collect();
        assert_eq!(nonces.len(), 2);
        for nonce in nonces {
            assert!(policy.contains(&format!("'nonce-{nonce}'")));
        }
    }

    #[tokio::test]
    async fn test_csp_nonces_differ_per_request() {
        let h = harness().await;
        let a = get(&h.app, "/add").await;
        let b = get(&h.app, "/add").await;

        let policy_a = header_str(&a, "content-security-policy").unwrap();
        let policy_b = header_str(&b, "content-security-policy").unwrap();
        assert!(policy_a.contains("'nonce-"));
        assert_ne!(policy_a, policy_b);
        assert!(header_str(&a, "content-type").unwrap().starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_authorized_requests_bypass_cache() {
        let h = harness().await;
        let request = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CACHE_STATUS_HEADER).is_none());
        assert!(h.cache.get("/").await.is_err());
    }

    #[tokio::test]
    async fn test_submit_normalizes_http_url() {
        let h = harness().await;
        let response = post_form(
            &h.app,
            "/add",
            "manifestUrl=http%3A%2F%2Fexample.com%2Fmanifest.json&idToken=valid-token",
        )
        .await;

        let id = compute_pwa_id("https://example.com/manifest.json");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(header_str(&response, "location"), Some(format!("/{id}").as_str()));
        assert_eq!(h.fetcher.requested(), vec!["https://example.com/manifest.json".to_string()]);

        let stored = h.db.find_pwa(&id).await.unwrap();
        assert_eq!(stored.manifest_url, "https://example.com/manifest.json");
        assert_eq!(stored.user.unwrap().id, "user-1");
    }

    #[tokio::test]
    async fn test_submit_empty_manifest_url() {
        let h = harness().await;
        let response = post_form(&h.app, "/add", "manifestUrl=&idToken=valid-token").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(error_message(&body_text(response).await).as_deref(), Some("no manifest provided"));
        assert_eq!(h.db.count_pwas().await.unwrap(), 0);
        assert!(h.fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_token() {
        let h = harness().await;
        let response = post_form(&h.app, "/add", "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(error_message(&body_text(response).await).as_deref(), Some("user not logged in"));
        assert_eq!(h.db.count_pwas().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_submit_rejected_token() {
        let h = harness().await;
        let response = post_form(
            &h.app,
            "/add",
            "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json&idToken=forged",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(error_message(&body_text(response).await).as_deref(), Some("user not logged in"));
        assert!(h.fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_submit_fetch_failure_keeps_url() {
        let h = harness_with(false, FakeFetcher { fail: true, ..Default::default() }).await;
        let response = post_form(
            &h.app,
            "/add",
            "manifestUrl=https%3A%2F%2Fexample.com%2Fmissing.json&idToken=valid-token",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert_eq!(error_message(&html).as_deref(), Some("error loading manifest"));
        assert!(html.contains(r#"value="https://example.com/missing.json""#));
        assert_eq!(h.db.count_pwas().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resubmission_updates_existing_record() {
        let h = harness().await;
        let body = "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json&idToken=valid-token";

        let first = post_form(&h.app, "/add", body).await;
        let second = post_form(&h.app, "/add", body).await;

        assert_eq!(header_str(&first, "location"), header_str(&second, "location"));
        assert_eq!(h.db.count_pwas().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submission_invalidates_cached_pages() {
        let h = harness().await;
        get(&h.app, "/").await;
        assert!(index_contains(&h.cache, "/").await);

        post_form(
            &h.app,
            "/add",
            "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json&idToken=valid-token",
        )
        .await;

        assert!(h.cache.keys().await.unwrap().is_empty());
        let response = get(&h.app, "/").await;
        assert_eq!(header_str(&response, CACHE_STATUS_HEADER), Some("miss"));
        assert!(body_text(response).await.contains("Fake App"));
    }

    #[tokio::test]
    async fn test_detail_page() {
        let h = harness().await;
        post_form(
            &h.app,
            "/add",
            "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json&idToken=valid-token",
        )
        .await;

        let id = compute_pwa_id("https://example.com/manifest.json");
        let response = get(&h.app, &format!("/{id}?contentOnly=true")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_text(response).await;
        assert!(!html.starts_with("<!DOCTYPE html>"));
        let doc = Html::parse_fragment(&html);
        let h1 = Selector::parse("h1").unwrap();
        assert_eq!(doc.select(&h1).next().unwrap().text().collect::<String>(), "Fake App");
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let h = harness().await;
        let response = get(&h.app, "/does-not-exist-id").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(h.cache.get("/does-not-exist-id").await.is_err());
    }

    #[tokio::test]
    async fn test_healthz() {
        let h = harness().await;
        let response = get(&h.app, "/healthz").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_legacy_routes_disabled_by_default() {
        let h = harness().await;
        assert_eq!(get(&h.app, "/pwas/add").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_legacy_create_duplicate() {
        let h = harness_with(true, FakeFetcher::default()).await;
        let body = "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json";

        let first = post_form(&h.app, "/pwas/add", body).await;
        assert_eq!(first.status(), StatusCode::SEE_OTHER);

        let second = post_form(&h.app, "/pwas/add", body).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(error_message(&body_text(second).await).as_deref(), Some("manifest already exists"));
        assert_eq!(h.fetcher.requested().len(), 1);

        let stored = h.db.find_pwa(&compute_pwa_id("https://example.com/manifest.json")).await.unwrap();
        assert!(stored.user.is_none());
    }

    #[tokio::test]
    async fn test_legacy_duplicate_with_different_host_case() {
        let h = harness_with(true, FakeFetcher::default()).await;
        post_form(&h.app, "/pwas/add", "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json").await;

        let response = post_form(&h.app, "/pwas/add", "manifestUrl=https%3A%2F%2FExample.COM%2Fmanifest.json").await;
        assert_eq!(error_message(&body_text(response).await).as_deref(), Some("manifest already exists"));
        assert_eq!(h.fetcher.requested(), vec!["https://example.com/manifest.json".to_string()]);
        assert_eq!(h.db.count_pwas().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_legacy_fetch_failure() {
        let h = harness_with(true, FakeFetcher { fail: true, ..Default::default() }).await;
        let response = post_form(&h.app, "/pwas/add", "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json").await;
        assert_eq!(error_message(&body_text(response).await).as_deref(), Some("error loading manifest"));
    }

    #[tokio::test]
    async fn test_legacy_list_edit_delete() {
        let h = harness_with(true, FakeFetcher::default()).await;
        post_form(&h.app, "/pwas/add", "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json").await;
        let id = compute_pwa_id("https://example.com/manifest.json");

        let listing = body_text(get(&h.app, "/pwas").await).await;
        assert!(listing.contains(&format!("/pwas/{id}")));

        let edit = post_form(
            &h.app,
            &format!("/pwas/{id}/edit"),
            "manifestUrl=https%3A%2F%2Fexample.com%2Fmanifest.json",
        )
        .await;
        assert_eq!(edit.status(), StatusCode::SEE_OTHER);

        let mismatched = post_form(
            &h.app,
            &format!("/pwas/{id}/edit"),
            "manifestUrl=https%3A%2F%2Fother.example%2Fmanifest.json",
        )
        .await;
        assert_eq!(mismatched.status(), StatusCode::OK);
        assert!(error_message(&body_text(mismatched).await).is_some());

        let deleted = get(&h.app, &format!("/pwas/{id}/delete")).await;
        assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
        assert_eq!(header_str(&deleted, "location"), Some("/pwas"));
        assert_eq!(h.db.count_pwas().await.unwrap(), 0);

        assert_eq!(get(&h.app, &format!("/pwas/{id}")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_legacy_pagination_token() {
        let h = harness_with(true, FakeFetcher::default()).await;
        for n in 0..11 {
            let body = format!("manifestUrl=https%3A%2F%2Fapp{n}.example.com%2Fmanifest.json");
            post_form(&h.app, "/pwas/add", &body).await;
        }

        let html = body_text(get(&h.app, "/pwas").await).await;
        let token = routes::legacy::encode_page_token(10);
        assert!(html.contains(&format!("/pwas?pageToken={token}")));

        let html = body_text(get(&h.app, &format!("/pwas?pageToken={token}")).await).await;
        let doc = Html::parse_document(&html);
        let items = Selector::parse("li.pwa").unwrap();
        assert_eq!(doc.select(&items).count(), 1);
    }
}
