//! Best-effort favicon capture for connect prompts.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use dapp_connector::types::injection::Document;
use hyper::{
    body::HttpBody, client::HttpConnector, header::CONTENT_TYPE, Body, Client, Uri,
};
use hyper_rustls::HttpsConnector;
use std::{str::FromStr, time::Duration};
use tracing::{debug, instrument};
use url::Url;

use crate::RelayError;

const DEFAULT_ICON_TYPE: &str = "image/x-icon";
/// Icons above this size are dropped rather than buffered.
pub const MAX_FAVICON_BYTES: usize = 256 * 1024;

/// Fetches one favicon URL and returns it as a `data:` URL.
#[async_trait]
pub trait FaviconFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, RelayError>;
}

/// [`FaviconFetcher`] over HTTPS (or plain HTTP) with a per-request timeout.
#[derive(Clone)]
pub struct HttpFaviconFetcher {
    client: Client<HttpsConnector<HttpConnector>>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpFaviconFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFaviconFetcher")
            .field("client", &"[Does not implement Debug]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpFaviconFetcher {
    pub fn new(timeout: Duration) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder().build(connector);

        Self { client, timeout }
    }

    async fn fetch_inner(&self, uri: Uri) -> Result<String, RelayError> {
        let response = self.client.get(uri).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::FaviconStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_ICON_TYPE)
            .to_string();
        let body = read_capped(response.into_body(), MAX_FAVICON_BYTES).await?;

        Ok(data_url(&content_type, &body))
    }
}

/// Read `body` to the end, failing as soon as it grows past `limit` bytes.
pub async fn read_capped(mut body: Body, limit: usize) -> Result<Vec<u8>, RelayError> {
    if body.size_hint().lower() > limit as u64 {
        return Err(RelayError::FaviconTooLarge(limit));
    }
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if bytes.len() + chunk.len() > limit {
            return Err(RelayError::FaviconTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

#[async_trait]
impl FaviconFetcher for HttpFaviconFetcher {
    async fn fetch(&self, url: &str) -> Result<String, RelayError> {
        let uri = Uri::from_str(url)?;
        tokio::time::timeout(self.timeout, self.fetch_inner(uri))
            .await
            .map_err(|_| RelayError::FaviconTimeout)?
    }
}

/// Never fetches anything. For builds that do not show favicons.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFavicon;

#[async_trait]
impl FaviconFetcher for NoFavicon {
    async fn fetch(&self, _url: &str) -> Result<String, RelayError> {
        Ok(String::new())
    }
}

pub fn data_url(content_type: &str, body: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(body))
}

/// Resolve an icon `href` against the page origin.
pub fn resolve_href(origin: &str, href: &str) -> Result<String, RelayError> {
    Ok(Url::parse(origin)?.join(href)?.into())
}

/// URLs to try, in order: the declared icon link, then `/favicon.ico`.
pub fn candidates(document: &dyn Document) -> Vec<String> {
    let origin = document.origin();
    let declared = document.icon_href().map(|href| resolve_href(&origin, &href));
    let fallback = resolve_href(&origin, "/favicon.ico");

    let mut urls = Vec::with_capacity(2);
    for url in declared.into_iter().chain([fallback]) {
        match url {
            Ok(url) if !urls.contains(&url) => urls.push(url),
            Ok(_) => {}
            Err(e) => debug!("Skipping unusable icon link: {}", e),
        }
    }
    urls
}

/// The page's favicon as a `data:` URL, or an empty string if every
/// candidate fails.
#[instrument(skip_all)]
pub async fn capture_favicon(fetcher: &dyn FaviconFetcher, document: &dyn Document) -> String {
    for url in candidates(document) {
        if url.starts_with("data:") {
            return url;
        }
        match fetcher.fetch(&url).await {
            Ok(icon) => return icon,
            Err(e) => debug!("Favicon candidate {} failed: {}", url, e),
        }
    }
    String::new()
}
