//! HTTP Client Abstraction
//!
//! Streamed downloads used by the offline cache.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Body of a successful download, read incrementally.
pub type DownloadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Async HTTP client trait
///
/// Implementations follow a bounded number of redirects and fail with
/// [`BridgeError::HttpStatus`](crate::error::BridgeError::HttpStatus) for any
/// final status other than 2xx, so callers never see an error page as content.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::HttpClient;
/// use tokio::io::AsyncReadExt;
///
/// async fn fetch(client: &dyn HttpClient) -> bridge_traits::error::Result<Vec<u8>> {
///     let mut body = client.download_stream("https://example.com/a.mp3".into()).await?;
///     let mut buf = Vec::new();
///     body.read_to_end(&mut buf).await?;
///     Ok(buf)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Download a file as a stream of bytes
    ///
    /// This is useful for large files that should not be loaded entirely into memory.
    async fn download_stream(&self, url: String) -> Result<DownloadStream>;
}
