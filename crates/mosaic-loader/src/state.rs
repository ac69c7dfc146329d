//! Shared application state contributed by tiles.
//!
//! Tiles register extensions, pages and translation overrides through
//! their [`TileApi`](crate::TileApi); everything lands here, tagged
//! with the owning tile name so [`AppState::prune`] can drop a tile's
//! registrations wholesale on teardown. The store is owned by the
//! orchestrator side and mutated only through this interface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use mosaic_core::TileName;
use mosaic_events::{EventBus, MosaicEvent};

/// One extension registered into a named slot.
#[derive(Debug, Clone)]
pub struct ExtensionRegistration {
    /// The tile that registered it.
    pub owner: TileName,
    /// Arbitrary registration payload (component reference, options).
    pub payload: Value,
}

/// One page registered under a route.
#[derive(Debug, Clone)]
pub struct PageRegistration {
    pub owner: TileName,
    pub payload: Value,
}

#[derive(Default)]
struct StateInner {
    /// Extension slot name → registrations, in registration order.
    extensions: HashMap<String, Vec<ExtensionRegistration>>,
    /// Route → page. Last registration wins.
    pages: HashMap<String, PageRegistration>,
    /// Tile-scoped translation overrides.
    translations: HashMap<TileName, HashMap<String, String>>,
}

/// The shared state store.
///
/// Short synchronous critical sections behind a [`RwLock`]; all
/// registration calls are cheap data moves.
pub struct AppState {
    inner: RwLock<StateInner>,
    gate: RefreshGate,
}

impl AppState {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: RwLock::new(StateInner::default()),
            gate: RefreshGate::new(events),
        }
    }

    /// The route-refresh gate, shared with the debug bridge.
    #[must_use]
    pub fn refresh_gate(&self) -> &RefreshGate {
        &self.gate
    }

    /// Register an extension into a slot. Registrations accumulate in
    /// call order, which for a batch load follows descriptor input
    /// order.
    pub fn register_extension(&self, owner: &TileName, slot: &str, payload: Value) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .extensions
            .entry(slot.to_string())
            .or_default()
            .push(ExtensionRegistration {
                owner: owner.clone(),
                payload,
            });
    }

    /// Snapshot the registrations for a slot, in registration order.
    #[must_use]
    pub fn extensions(&self, slot: &str) -> Vec<ExtensionRegistration> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.extensions.get(slot).cloned().unwrap_or_default()
    }

    /// Register a page under a route, replacing any previous page for
    /// that route, and flag the routes as changed.
    pub fn register_page(&self, owner: &TileName, route: &str, payload: Value) {
        {
            let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            inner.pages.insert(
                route.to_string(),
                PageRegistration {
                    owner: owner.clone(),
                    payload,
                },
            );
        }
        self.gate.notify();
    }

    /// The page registered for a route, if any.
    #[must_use]
    pub fn page(&self, route: &str) -> Option<PageRegistration> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.pages.get(route).cloned()
    }

    /// Set a tile-scoped translation override.
    pub fn set_translation(&self, owner: &TileName, key: &str, value: &str) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .translations
            .entry(owner.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Look up a tile-scoped translation.
    #[must_use]
    pub fn translate(&self, owner: &TileName, key: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.translations.get(owner)?.get(key).cloned()
    }

    /// Drop every registration owned by a tile.
    ///
    /// Called after teardown so the tile cannot linger with live
    /// registrations but no code to update them. Flags routes as
    /// changed if any page was dropped.
    pub fn prune(&self, owner: &TileName) {
        let dropped_pages = {
            let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            for slot in inner.extensions.values_mut() {
                slot.retain(|reg| &reg.owner != owner);
            }
            inner.extensions.retain(|_, slot| !slot.is_empty());
            inner.translations.remove(owner);

            let before = inner.pages.len();
            inner.pages.retain(|_, page| &page.owner != owner);
            inner.pages.len() != before
        };

        debug!(tile = %owner, "Pruned tile registrations");
        if dropped_pages {
            self.gate.notify();
        }
    }
}

struct GateInner {
    frozen: AtomicUsize,
    dirty: AtomicBool,
    events: EventBus,
}

/// Gate over route-refresh side effects.
///
/// While at least one [`RefreshFreeze`] is held, route changes only
/// mark the gate dirty; the `RoutesRefreshed` event fires once when
/// the last freeze is released. Unfrozen changes fire immediately.
#[derive(Clone)]
pub struct RefreshGate {
    inner: Arc<GateInner>,
}

impl RefreshGate {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: Arc::new(GateInner {
                frozen: AtomicUsize::new(0),
                dirty: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Record a route change, firing or deferring the refresh.
    pub fn notify(&self) {
        if self.inner.frozen.load(Ordering::SeqCst) > 0 {
            self.inner.dirty.store(true, Ordering::SeqCst);
        } else {
            self.inner.events.publish(MosaicEvent::RoutesRefreshed);
        }
    }

    /// Freeze route refreshes until the returned guard is dropped.
    #[must_use]
    pub fn freeze(&self) -> RefreshFreeze {
        self.inner.frozen.fetch_add(1, Ordering::SeqCst);
        RefreshFreeze {
            inner: Arc::clone(&self.inner),
        }
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst) > 0
    }
}

/// RAII guard returned by [`RefreshGate::freeze`].
///
/// Dropping the last outstanding guard releases the gate; if any route
/// change happened while frozen, exactly one `RoutesRefreshed` event
/// fires.
pub struct RefreshFreeze {
    inner: Arc<GateInner>,
}

impl Drop for RefreshFreeze {
    fn drop(&mut self) {
        let remaining = self.inner.frozen.fetch_sub(1, Ordering::SeqCst);
        if remaining == 1 && self.inner.dirty.swap(false, Ordering::SeqCst) {
            self.inner.events.publish(MosaicEvent::RoutesRefreshed);
        }
    }
}
