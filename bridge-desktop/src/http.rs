//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{DownloadStream, HttpClient},
};
use futures_util::TryStreamExt;
use reqwest::{redirect, Client};
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

/// Redirects followed before a download is abandoned.
pub const DEFAULT_MAX_REDIRECTS: usize = 1;

/// Reqwest-based HTTP client implementation
///
/// Provides streamed downloads with:
/// - Connection pooling via reqwest
/// - A bounded redirect chain
/// - TLS through rustls
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_redirects(DEFAULT_MAX_REDIRECTS, Duration::from_secs(10))
    }

    /// Create a client following at most `max_redirects` hops.
    ///
    /// Only the connection phase is bounded by `connect_timeout`; the body of
    /// a long track may take minutes and is bounded by the cache store.
    pub fn with_redirects(max_redirects: usize, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(redirect::Policy::limited(max_redirects))
            .pool_max_idle_per_host(2)
            .user_agent(concat!("piradio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn download_stream(&self, url: String) -> Result<DownloadStream> {
        debug!(url = %url, "Starting download");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_redirect() {
                warn!(url = %url, "Too many redirects");
            }
            BridgeError::OperationFailed(format!("GET {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        debug!(
            url = %url,
            content_length = ?response.content_length(),
            "Download response received"
        );

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }
}
