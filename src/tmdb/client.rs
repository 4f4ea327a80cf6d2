use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};

const ERROR_BODY_CHARS: usize = 200;

/// The only seam that touches the network.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// GETs `url` and returns the complete body; non-2xx is a transport error.
    async fn get(&self, url: &str) -> CatalogResult<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
}

impl HttpRemote {
    pub fn new() -> anyhow::Result<Self> {
        let user_agent = format!("popmovies/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn get(&self, url: &str) -> CatalogResult<Vec<u8>> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::transport(format!("request failed: {}", e.without_url())))?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| CatalogError::transport(format!("reading body failed: {}", e.without_url())))?;
        if !status.is_success() {
            return Err(CatalogError::transport(format!(
                "HTTP {}: {}",
                status,
                body_excerpt(&bytes)
            )));
        }
        debug!(status = %status, bytes = bytes.len(), "TMDB response received");
        Ok(bytes.to_vec())
    }
}

/// Leading text of an error body, whitespace collapsed, cut at `ERROR_BODY_CHARS`.
fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let mut excerpt: String = chars.by_ref().take(ERROR_BODY_CHARS).collect();
    if chars.next().is_some() {
        excerpt.push_str("...");
    }
    excerpt
}
