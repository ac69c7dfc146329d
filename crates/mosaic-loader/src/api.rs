//! The per-tile capability API.
//!
//! One [`TileApi`] is built per tile and lives exactly as long as the
//! tile is attached: `setup` receives it to register capabilities,
//! `teardown` receives the same instance, and the orchestrator drops
//! it when the tile leaves the active set.

use std::sync::Arc;

use serde_json::Value;

use mosaic_core::{TileMeta, TileName};
use mosaic_events::{EventBus, MosaicEvent};

use crate::resolver::{DependencyScope, Resolved};
use crate::state::AppState;

/// Capability object handed to a tile's `setup` and `teardown`.
///
/// Combines the shared surface (state store, event bus) with
/// module-scoped pieces: the tile's own metadata, its dependency scope
/// and its translation overrides.
pub struct TileApi {
    meta: TileMeta,
    state: Arc<AppState>,
    events: EventBus,
    scope: DependencyScope,
}

impl TileApi {
    #[must_use]
    pub fn new(
        meta: TileMeta,
        state: Arc<AppState>,
        events: EventBus,
        scope: DependencyScope,
    ) -> Self {
        Self {
            meta,
            state,
            events,
            scope,
        }
    }

    /// The tile this API belongs to.
    #[must_use]
    pub fn meta(&self) -> &TileMeta {
        &self.meta
    }

    #[must_use]
    pub fn name(&self) -> &TileName {
        &self.meta.name
    }

    /// The dependency scope negotiated for this load. Read-only.
    #[must_use]
    pub fn dependency(&self, name: &str) -> Option<&Resolved> {
        self.scope.get(name)
    }

    /// Register an extension into a named slot.
    pub fn register_extension(&self, slot: &str, payload: Value) {
        self.state.register_extension(&self.meta.name, slot, payload);
    }

    /// Registrations currently in a slot (own and foreign).
    #[must_use]
    pub fn extensions(&self, slot: &str) -> Vec<crate::state::ExtensionRegistration> {
        self.state.extensions(slot)
    }

    /// Register a page under a route. Replaces any previous page for
    /// that route.
    pub fn register_page(&self, route: &str, payload: Value) {
        self.state.register_page(&self.meta.name, route, payload);
    }

    /// Set a translation override scoped to this tile.
    pub fn set_translation(&self, key: &str, value: &str) {
        self.state.set_translation(&self.meta.name, key, value);
    }

    /// Look up one of this tile's translation overrides.
    #[must_use]
    pub fn translate(&self, key: &str) -> Option<String> {
        self.state.translate(&self.meta.name, key)
    }

    /// Publish an event on the host bus.
    pub fn emit(&self, event: MosaicEvent) {
        self.events.publish(event);
    }
}

impl std::fmt::Debug for TileApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileApi")
            .field("tile", &self.meta.name)
            .field("dependencies", &self.scope.len())
            .finish_non_exhaustive()
    }
}
