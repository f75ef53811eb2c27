//! Manifest fetch pipeline with SSRF protection.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//!
//! ### Safety Gates
//! - Resolve DNS and refuse private/reserved answers (unless explicitly allowed)
//! - Max redirects: 5, each hop checked like the original URL
//! - Max body bytes: configurable, enforced while streaming
//!
//! ### Parsing
//! - Successful bodies go through [`parse_manifest`](crate::manifest::parse_manifest)

pub mod guard;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, header};
use url::Url;

pub use guard::{GuardError, canonicalize, check_host, is_blocked};

use crate::manifest::parse_manifest;
use pwadir_core::{AppConfig, Error, Manifest};

const ACCEPT_MANIFEST: &str = "application/manifest+json, application/json;q=0.9, */*;q=0.1";

/// Retrieves and parses the manifest behind a URL.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, manifest_url: &str) -> Result<Manifest, Error>;
}

/// Configuration for the manifest fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "pwa-directory/0.1")
    pub user_agent: String,

    /// Maximum manifest size in bytes (default: 1MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Skip the private address check (default: false)
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_manifest_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
            allow_private_hosts: config.allow_private_hosts,
        }
    }
}

/// Raw response from a manifest fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The final URL after redirects
    pub final_url: Url,
    pub bytes: Bytes,
}

/// Manifest fetcher over reqwest.
///
/// Redirects are followed here rather than by reqwest so that every hop
/// passes the same address check as the submitted URL.
pub struct HttpManifestFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpManifestFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Refuse `url` if its host resolves to a private or reserved address.
    async fn gate(&self, url: &Url) -> Result<(), Error> {
        if self.config.allow_private_hosts {
            return Ok(());
        }
        check_host(url).await.map_err(|e| match e {
            GuardError::BlockedAddress(_) => Error::SsrfBlocked(format!("{url}: {e}")),
            _ => Error::InvalidUrl(e.to_string()),
        })
    }

    /// Resolve a `Location` header against `from` and gate the target.
    async fn follow_redirect(&self, from: &Url, location: &str) -> Result<Url, Error> {
        let target = from
            .join(location.trim())
            .map_err(|e| Error::InvalidUrl(format!("redirect from {from} to {location}: {e}")))?;
        let target = canonicalize(target.as_str()).map_err(|e| Error::InvalidUrl(format!("redirect from {from}: {e}")))?;
        self.gate(&target).await?;
        Ok(target)
    }

    /// Fetch a URL, returning raw bytes and the URL they were served from.
    ///
    /// Performs the SSRF check on the URL and on every redirect hop, and
    /// enforces the redirect cap and byte limit.
    pub async fn fetch_raw(&self, url: &Url) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        self.gate(url).await?;

        let mut current = url.clone();
        let mut redirects = 0;
        let mut response = loop {
            let response = self
                .http
                .get(current.as_str())
                .header(header::ACCEPT, ACCEPT_MANIFEST)
                .send()
                .await
                .map_err(|e| self.request_error(&current, e))?;

            if !response.status().is_redirection() {
                break response;
            }
            let location = response.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()).map(str::to_string);
            let Some(location) = location else {
                break response;
            };
            if redirects >= self.config.max_redirects {
                return Err(Error::HttpError(format!("{url}: more than {} redirects", self.config.max_redirects)));
            }
            redirects += 1;

            let next = self.follow_redirect(&current, &location).await?;
            tracing::debug!(from = %current, to = %next, "following manifest redirect");
            current = next;
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("{current} returned status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.request_error(&current, e))? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(%url, final_url = %current, redirects, fetch_ms, bytes = body.len(), "fetched manifest");

        Ok(FetchResponse { final_url: current, bytes: body.freeze() })
    }

    fn request_error(&self, url: &Url, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::FetchTimeout(format!("{url} after {}ms", self.config.timeout.as_millis()))
        } else {
            Error::HttpError(format!("network error: {e}"))
        }
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch(&self, manifest_url: &str) -> Result<Manifest, Error> {
        let url = canonicalize(manifest_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let response = self.fetch_raw(&url).await?;

        // Relative members resolve against where the manifest was actually served from.
        let mut manifest = parse_manifest(&response.final_url, &response.bytes)?;
        manifest.url = url.to_string();
        Ok(manifest)
    }
}
