//! HTTP client for the development feed endpoint.

use async_trait::async_trait;
use tracing::debug;

use mosaic_core::TileDescriptor;

use crate::error::DebugResult;

/// Source of the current descriptor set.
///
/// [`FeedClient`] is the production implementation; tests drive the
/// bridge with stub feeds instead of a live endpoint.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current descriptor set.
    ///
    /// # Errors
    ///
    /// Returns an error when the feed cannot be reached or parsed.
    async fn fetch_initial(&self) -> DebugResult<Vec<TileDescriptor>>;
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_initial(&self) -> DebugResult<Vec<TileDescriptor>> {
        FeedClient::fetch_initial(self).await
    }
}

/// Fetches the current descriptor set from the development feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: String,
}

impl FeedClient {
    /// Create a client for the given feed URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// The feed URL this client targets.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the initial descriptor set.
    ///
    /// The feed may answer with a single descriptor or an array; both
    /// shapes normalize to a list.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or a
    /// body that is neither a descriptor nor a descriptor array.
    pub async fn fetch_initial(&self) -> DebugResult<Vec<TileDescriptor>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let descriptors = parse_feed_body(&body)?;
        debug!(url = %self.url, count = descriptors.len(), "Fetched development feed");
        Ok(descriptors)
    }
}

fn parse_feed_body(body: &str) -> Result<Vec<TileDescriptor>, serde_json::Error> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Body {
        Many(Vec<TileDescriptor>),
        One(TileDescriptor),
    }

    Ok(match serde_json::from_str(body)? {
        Body::Many(list) => list,
        Body::One(one) => vec![one],
    })
}
