//! Tile payload and manifest fetching.
//!
//! The fetcher performs exactly one attempt per request; retries are
//! the caller's concern and no timeout is imposed here (configure the
//! injected [`reqwest::Client`] for that). Network and parse failures
//! surface as [`LoaderError::Fetch`], distinguishable from evaluation
//! failures.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use mosaic_core::TileDescriptor;

use crate::error::{LoaderError, LoaderResult};

/// Raw executable payload of a fetched tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePayload {
    /// The module bytes as delivered.
    pub bytes: Vec<u8>,
}

impl TilePayload {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Retrieves tile payloads and manifests.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fetch a tile's executable payload.
    ///
    /// `integrity` is the descriptor's content hash when it carries
    /// one; implementations may use it as a cache key. Single attempt,
    /// no retries.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Fetch`] on network failure.
    async fn fetch_source(
        &self,
        url: &str,
        integrity: Option<&str>,
    ) -> LoaderResult<Arc<TilePayload>>;

    /// Fetch a bundle manifest: an ordered list of nested descriptors,
    /// each classified and loaded independently by the caller.
    ///
    /// A response holding a single descriptor object is treated as a
    /// one-element list. A malformed entry inside an array is skipped
    /// (reported via logging) without failing its siblings.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Fetch`] on network failure or when the
    /// body is not a descriptor or descriptor array at all.
    async fn fetch_manifest(&self, url: &str) -> LoaderResult<Vec<TileDescriptor>>;

    /// Fetch a v1 dependency-requirement manifest: the names the tile
    /// declares as shared requirements.
    ///
    /// Accepts either a JSON array of names or an object whose keys
    /// are the names.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Fetch`] on network or parse failure.
    async fn fetch_require_manifest(&self, url: &str) -> LoaderResult<Vec<String>>;
}

/// HTTP fetcher with a process-wide payload cache.
///
/// Payloads are cached keyed by content hash when the descriptor
/// carries one (identical content fetched under different URLs is
/// shared), otherwise by URL. Manifests are never cached: the feed may
/// legitimately change between loads.
pub struct HttpTileFetcher {
    client: reqwest::Client,
    cache: DashMap<String, Arc<TilePayload>>,
}

impl HttpTileFetcher {
    /// Create a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a fetcher around an existing client (the client owns any
    /// timeout or proxy policy).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }

    async fn get_bytes(&self, url: &str) -> LoaderResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| LoaderError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let bytes = response.bytes().await.map_err(|e| LoaderError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn get_json(&self, url: &str) -> LoaderResult<serde_json::Value> {
        let bytes = self.get_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| LoaderError::Fetch {
            url: url.to_string(),
            message: format!("invalid JSON: {e}"),
        })
    }
}

impl Default for HttpTileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch_source(
        &self,
        url: &str,
        integrity: Option<&str>,
    ) -> LoaderResult<Arc<TilePayload>> {
        let key = integrity.unwrap_or(url);
        if let Some(hit) = self.cache.get(key) {
            trace!(url, key, "Tile payload cache hit");
            return Ok(Arc::clone(&hit));
        }

        debug!(url, "Fetching tile payload");
        let payload = Arc::new(TilePayload::new(self.get_bytes(url).await?));
        self.cache.insert(key.to_string(), Arc::clone(&payload));
        Ok(payload)
    }

    async fn fetch_manifest(&self, url: &str) -> LoaderResult<Vec<TileDescriptor>> {
        debug!(url, "Fetching bundle manifest");
        let value = self.get_json(url).await?;
        parse_descriptor_list(url, value)
    }

    async fn fetch_require_manifest(&self, url: &str) -> LoaderResult<Vec<String>> {
        debug!(url, "Fetching dependency-requirement manifest");
        let value = self.get_json(url).await?;
        match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(name) => Ok(name),
                    other => Err(LoaderError::Fetch {
                        url: url.to_string(),
                        message: format!("expected dependency name string, got {other}"),
                    }),
                })
                .collect(),
            serde_json::Value::Object(map) => Ok(map.into_iter().map(|(name, _)| name).collect()),
            other => Err(LoaderError::Fetch {
                url: url.to_string(),
                message: format!("expected array or object, got {other}"),
            }),
        }
    }
}

/// Parse a feed response holding either one descriptor or an array.
pub(crate) fn parse_descriptor_list(
    url: &str,
    value: serde_json::Value,
) -> LoaderResult<Vec<TileDescriptor>> {
    match value {
        // A malformed entry drops only itself: sibling descriptors in
        // the same manifest still load.
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!(url, error = %e, "Skipping invalid descriptor in manifest");
                    None
                },
            })
            .collect()),
        object @ serde_json::Value::Object(_) => Ok(vec![
            serde_json::from_value(object).map_err(|e| LoaderError::Fetch {
                url: url.to_string(),
                message: format!("invalid descriptor: {e}"),
            })?,
        ]),
        other => Err(LoaderError::Fetch {
            url: url.to_string(),
            message: format!("expected descriptor or array, got {other}"),
        }),
    }
}
