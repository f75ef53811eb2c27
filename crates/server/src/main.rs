//! pwa-directory server entry point.
//!
//! Loads configuration, opens the database, and serves the directory over HTTP.
//! Logs go to stderr as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use pwadir_client::{FetchConfig, HttpManifestFetcher, JwtVerifier};
use pwadir_core::{AppConfig, Db, PageCache};
use pwadir_server::{AppState, app, logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = AppConfig::load()?;
    let addr = config.socket_addr()?;

    tracing::info!(db_path = %config.db_path.display(), "opening database");
    let db = Db::open(&config.db_path).await?;

    let cache = PageCache::new(Arc::new(db.clone()), config.cache_ttl_secs);
    let fetcher = HttpManifestFetcher::new(FetchConfig::from(&config))?;
    let verifier = JwtVerifier::from_config(&config);

    let purge_every = Duration::from_secs(config.cache_ttl_secs.unsigned_abs());
    let purger = server::spawn_cache_purger(cache.clone(), purge_every);

    let state = AppState {
        store: Arc::new(db),
        cache,
        fetcher: Arc::new(fetcher),
        verifier: Arc::new(verifier),
        config: Arc::new(config),
    };

    tracing::info!(
        legacy_routes = state.config.legacy_routes,
        cache_enabled = state.config.cache_enabled,
        "starting pwa-directory"
    );
    let result = server::serve(addr, app(state)).await;
    purger.abort();
    result
}
