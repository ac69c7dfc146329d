//! Event types published on the bus.

use std::fmt;

use mosaic_core::TileName;

/// The lifecycle stage a per-tile failure occurred in.
///
/// Classification is not listed: it is total and cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// Network or manifest-parse failure while retrieving the tile.
    Fetch,
    /// The fetched payload is not a valid tile (bad module, missing
    /// `setup` export).
    Evaluate,
    /// The tile's `setup` entry point failed.
    Setup,
    /// The tile's `teardown` entry point failed. The tile is still
    /// removed from the active set.
    Teardown,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Evaluate => "evaluate",
            Self::Setup => "setup",
            Self::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Events published by the loader, orchestrator and debug bridge.
#[derive(Debug, Clone)]
pub enum MosaicEvent {
    /// A tile completed setup and joined the active set.
    TileLoaded { name: TileName },
    /// A tile failed at some lifecycle stage. Siblings are unaffected.
    TileFailed {
        name: TileName,
        stage: LoadStage,
        error: String,
    },
    /// A tile was torn down and left the active set.
    TileRemoved { name: TileName },
    /// A declared dependency resolved to nothing. The tile still loads
    /// (legacy policy); this event makes the condition observable.
    DependencyMissing {
        tile: TileName,
        dependency: String,
    },
    /// The debug bridge scheduled a reload for a tile (debounced).
    ReloadScheduled { name: TileName },
    /// The route-refresh freeze was fully released; the host should
    /// refresh its routes exactly once.
    RoutesRefreshed,
    /// The debug channel requested a full application reload,
    /// bypassing partial reload entirely.
    FullReloadRequested,
}

impl MosaicEvent {
    /// Short type tag for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TileLoaded { .. } => "tile.loaded",
            Self::TileFailed { .. } => "tile.failed",
            Self::TileRemoved { .. } => "tile.removed",
            Self::DependencyMissing { .. } => "dependency.missing",
            Self::ReloadScheduled { .. } => "reload.scheduled",
            Self::RoutesRefreshed => "routes.refreshed",
            Self::FullReloadRequested => "reload.full",
        }
    }
}
