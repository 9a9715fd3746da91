pub mod fetcher;
pub mod file;

#[cfg(feature = "reqwest")]
pub mod reqwest;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use fetcher::{DataFetcher, StorageContext};

/// Byte access to a named resource, local or remote.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError>;

    async fn get_range(
        &self,
        url: &str,
        offset: u64,
        length: usize,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let mut all_headers = headers.unwrap_or_default();
        all_headers.insert("Range".to_string(), range_header(offset, length)?);

        self.get(url, Some(all_headers)).await
    }

    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        url: &str,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<T, ResourceError> {
        let bytes = self.get(url, headers).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl<C: ResourceClient> ResourceClient for Arc<C> {
    async fn get(
        &self,
        url: &str,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        (**self).get(url, headers).await
    }

    async fn get_range(
        &self,
        url: &str,
        offset: u64,
        length: usize,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        (**self).get_range(url, offset, length, headers).await
    }
}

/// `Range` header value for `length` bytes starting at `offset`, both ends inclusive.
pub fn range_header(offset: u64, length: usize) -> Result<String, ResourceError> {
    let end = offset
        .checked_add(length as u64)
        .and_then(|v| v.checked_sub(1))
        .ok_or_else(|| ResourceError::Other("Range overflow".into()))?;
    Ok(format!("bytes={}-{}", offset, end))
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status code: {0}")]
    Status(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),

    #[error("Unsupported scheme: {0}")]
    Unsupported(String),
}

impl ResourceError {
    /// Transport failures a caller may retry or skip.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            ResourceError::Network(_) | ResourceError::Timeout(_) | ResourceError::Status(_)
        )
    }
}
