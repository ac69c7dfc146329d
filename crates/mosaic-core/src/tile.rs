//! Tile identity and metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Unique, stable tile identifier.
///
/// Tile names come from the feed and from live-update notifications,
/// so they are validated on construction rather than trusted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileName(String);

impl<'de> Deserialize<'de> for TileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl TileName {
    /// Validate and wrap a tile name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidName`] if the name is empty or
    /// contains whitespace.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::InvalidName("must not be empty".into()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidName(format!(
                "must not contain whitespace, got: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Static metadata for a loaded tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMeta {
    /// The tile's unique name.
    pub name: TileName,
    /// Declared version, if the descriptor carried one.
    pub version: Option<String>,
    /// Base path the tile's relative assets resolve against.
    pub base_path: String,
}

impl TileMeta {
    #[must_use]
    pub fn new(name: TileName, version: Option<String>, base_path: String) -> Self {
        Self {
            name,
            version,
            base_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(TileName::new("shop-cart").is_ok());
        assert!(TileName::new("@scope/tile").is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(TileName::new("").is_err());
    }

    #[test]
    fn whitespace_rejected() {
        assert!(TileName::new("shop cart").is_err());
        assert!(TileName::new("tab\ttile").is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<TileName, _> = serde_json::from_str("\"a\"");
        assert!(ok.is_ok());
        let bad: Result<TileName, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
