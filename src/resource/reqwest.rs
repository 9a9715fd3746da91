use super::{range_header, ResourceClient, ResourceError};
use crate::config::LoaderConfig;
use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Client honouring the configured request timeout.
    pub fn from_config(config: &LoaderConfig) -> Result<Self, ResourceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(map_reqwest_error)?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        url: &str,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<reqwest::Response, ResourceError> {
        let mut req = self.client.get(url);
        if let Some(hdrs) = headers {
            for (k, v) in hdrs {
                req = req.header(k, v);
            }
        }
        let resp = req.send().await.map_err(map_reqwest_error)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ResourceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ResourceError::Status(status.as_u16()));
        }
        Ok(resp)
    }
}

fn map_reqwest_error(error: reqwest::Error) -> ResourceError {
    if error.is_timeout() {
        ResourceError::Timeout(error.to_string())
    } else {
        ResourceError::Network(error.to_string())
    }
}

#[async_trait]
impl ResourceClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        headers: Option<BTreeMap<String, String>>,
    ) -> Result<Vec<u8>, ResourceError> {
        let resp = self.send(url, headers).await?;
        Ok(resp.bytes().await.map_err(map_reqwest_error)?.to_vec())
    }

    /// Accumulates the body until `length` bytes arrived or the stream ends;
    /// a short body is returned as is.
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

        let mut resp = self.send(url, Some(all_headers)).await?;

        // a plain 200 means the server ignored the range and sends the whole resource
        let mut skip = if resp.status() == StatusCode::PARTIAL_CONTENT {
            0
        } else {
            debug!(url, "server ignored range request");
            offset as usize
        };

        let mut buf = BytesMut::with_capacity(length);
        while buf.len() < length {
            let Some(mut chunk) = resp.chunk().await.map_err(map_reqwest_error)? else {
                break;
            };
            if skip > 0 {
                let dropped = skip.min(chunk.len());
                let _ = chunk.split_to(dropped);
                skip -= dropped;
            }
            let wanted = (length - buf.len()).min(chunk.len());
            buf.extend_from_slice(&chunk[..wanted]);
        }

        Ok(buf.freeze().to_vec())
    }
}
