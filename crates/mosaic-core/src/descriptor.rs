//! Tile descriptor wire model.
//!
//! A descriptor identifies one loadable unit as delivered by the feed
//! service. Field names match the feed wire format exactly; which
//! fields are present determines the loading protocol (see
//! [`classify`](crate::classify::classify)). Unrecognized fields are
//! preserved in `extra` so unknown shapes pass through unmodified.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::tile::{TileMeta, TileName};

/// A single tile descriptor as received from the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileDescriptor {
    /// The tile's unique name.
    pub name: TileName,
    /// Declared version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Content hash (legacy v0 protocol).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Reference to a separately fetched dependency-requirement
    /// manifest (v1 protocol).
    #[serde(
        default,
        rename = "requireRef",
        skip_serializing_if = "Option::is_none"
    )]
    pub require_ref: Option<String>,
    /// URL of the tile's bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Explicit protocol hint (e.g. `"v2"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    /// Marks a bundle-of-bundles descriptor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bundle: bool,
    /// Inline shared dependency list (v2 protocol): dependency name to
    /// URL, optionally carrying a `#<hash>` fragment used as the
    /// process-wide cache key.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dependencies: HashMap<String, String>,
    /// Inline source payload (legacy descriptors may embed their code
    /// instead of linking it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Any further fields, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TileDescriptor {
    /// Create a minimal descriptor with only a name.
    #[must_use]
    pub fn named(name: TileName) -> Self {
        Self {
            name,
            version: None,
            hash: None,
            require_ref: None,
            link: None,
            spec: None,
            bundle: false,
            dependencies: HashMap::new(),
            content: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Derive the tile's static metadata.
    ///
    /// The base path is everything up to (and including) the final
    /// path segment of `link`; descriptors without a link get an empty
    /// base path and resolve assets relative to the host.
    #[must_use]
    pub fn meta(&self) -> TileMeta {
        TileMeta::new(
            self.name.clone(),
            self.version.clone(),
            self.base_path().unwrap_or_default(),
        )
    }

    fn base_path(&self) -> Option<String> {
        let link = self.link.as_deref()?;
        if let Ok(mut url) = Url::parse(link) {
            url.set_fragment(None);
            url.set_query(None);
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop();
                segments.push("");
            }
            return Some(url.to_string());
        }
        // Relative links: cut at the last slash.
        link.rfind('/').map(|idx| link[..=idx].to_string())
    }
}
