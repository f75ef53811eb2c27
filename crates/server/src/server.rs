use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use pwadir_core::PageCache;
use tokio::net::TcpListener;

/// Serve `router` on `addr` until ctrl-c.
pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}

/// Resolve when `signal` fires. A signal that cannot be installed never resolves.
async fn wait_for_shutdown(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Periodically delete expired cached pages.
pub fn spawn_cache_purger(cache: PageCache, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match cache.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "purged expired pages"),
                Err(e) => tracing::warn!(error = %e, "failed to purge expired pages"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_on_signal() {
        let signal = async { Ok::<(), std::io::Error>(()) };
        let waited = tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(signal)).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_failed_signal_keeps_serving() {
        let failing = async { Err(std::io::Error::other("no signal handler")) };
        let waited = tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(failing)).await;
        assert!(waited.is_err());
    }
}
