use mosaic_core::TileName;
use mosaic_events::LoadStage;
use thiserror::Error;

/// Errors that can occur while loading, setting up or tearing down a
/// tile.
///
/// Fetch and evaluate failures are distinct variants so callers can
/// tell a network problem from an invalid module. All of these are
/// per-tile conditions: the orchestrator reports them on the event bus
/// and continues with sibling tiles.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Network or parse failure while retrieving a payload or
    /// manifest.
    #[error("Failed to fetch {url}: {message}")]
    Fetch {
        /// The URL that failed.
        url: String,
        /// The underlying error message.
        message: String,
    },
    /// The fetched payload is not a loadable tile.
    #[error("Invalid tile {name}: {message}")]
    Evaluate { name: TileName, message: String },
    /// The tile's `setup` entry point failed.
    #[error("Setup of tile {name} failed: {message}")]
    Setup { name: TileName, message: String },
    /// The tile's `teardown` entry point failed. The tile is removed
    /// from the active set regardless.
    #[error("Teardown of tile {name} failed: {message}")]
    Teardown { name: TileName, message: String },
    /// A descriptor gave the loader nothing to fetch or evaluate.
    #[error("Tile {name} has neither inline content nor a link")]
    NoSource { name: TileName },
}

impl LoaderError {
    /// The lifecycle stage this error belongs to, for reporting.
    #[must_use]
    pub fn stage(&self) -> LoadStage {
        match self {
            Self::Fetch { .. } | Self::NoSource { .. } => LoadStage::Fetch,
            Self::Evaluate { .. } => LoadStage::Evaluate,
            Self::Setup { .. } => LoadStage::Setup,
            Self::Teardown { .. } => LoadStage::Teardown,
        }
    }
}

/// A specialized Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
