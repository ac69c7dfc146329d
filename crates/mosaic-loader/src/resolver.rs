//! Shared dependency resolution.
//!
//! Builds the per-load [`DependencyScope`] a tile's evaluator sees.
//! Resolution policy varies by protocol kind, but a name that resolves
//! at all always resolves to the same live instance for the lifetime
//! of the application: framework externals and process-wide shared
//! instances are registered once and never replaced, and remote assets
//! are cached append-only by content hash. Referential identity is
//! what lets a router or state context behave as a singleton across
//! tiles.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use mosaic_core::{ProtocolKind, TileDescriptor, TileName};
use mosaic_events::{EventBus, MosaicEvent};

use crate::error::LoaderResult;
use crate::fetcher::TileFetcher;

/// A live reference to a shared dependency instance.
///
/// The payload is opaque to the resolver; hosts downcast it at the
/// point of use. Clones share the same underlying instance, so
/// identity is observable via [`DependencyHandle::same_instance`].
#[derive(Clone)]
pub struct DependencyHandle {
    name: Arc<str>,
    instance: Arc<dyn Any + Send + Sync>,
}

impl DependencyHandle {
    /// Wrap an instance under a dependency name.
    pub fn new(name: impl Into<String>, instance: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            name: name.into().into(),
            instance,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the instance as a concrete type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref()
    }

    /// Whether two handles point at the very same live instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl std::fmt::Debug for DependencyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of resolving one dependency name.
///
/// `Missing` preserves the legacy contract: a declared name absent
/// from every source resolves to nothing without failing the load, so
/// tiles must defensively check. The condition is reported on the bus.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A live shared instance.
    Instance(DependencyHandle),
    /// Nothing to bind; the tile sees an absent import.
    Missing,
}

impl Resolved {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// The read-only dependency map handed to a scoped evaluation.
#[derive(Debug, Clone, Default)]
pub struct DependencyScope {
    entries: HashMap<String, Resolved>,
}

impl DependencyScope {
    /// Look up a dependency by name. `None` means the name was never
    /// in scope at all (as opposed to declared-but-missing).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.entries.get(name)
    }

    /// Names visible to the evaluation, including missing ones.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: String, resolved: Resolved) {
        self.entries.insert(name, resolved);
    }
}

/// Builds dependency scopes per protocol kind.
pub struct DependencyResolver {
    /// Fixed framework-level externals (router, state bindings). The
    /// only names legacy tiles may import.
    framework: HashMap<String, DependencyHandle>,
    /// Process-wide shared instances registered by the host. First
    /// registration wins; never replaced.
    shared: DashMap<String, DependencyHandle>,
    /// Remote assets cached by content hash. Append-only for the
    /// application's lifetime.
    remote_cache: DashMap<String, DependencyHandle>,
    fetcher: Arc<dyn TileFetcher>,
    events: EventBus,
}

impl DependencyResolver {
    /// Create a resolver with an empty framework set.
    #[must_use]
    pub fn new(fetcher: Arc<dyn TileFetcher>, events: EventBus) -> Self {
        Self {
            framework: HashMap::new(),
            shared: DashMap::new(),
            remote_cache: DashMap::new(),
            fetcher,
            events,
        }
    }

    /// Add a framework-level external (builder-style, at construction
    /// only — the set is fixed afterwards).
    #[must_use]
    pub fn with_framework(mut self, handle: DependencyHandle) -> Self {
        self.framework.insert(handle.name().to_string(), handle);
        self
    }

    /// Register a process-wide shared instance.
    ///
    /// Returns `false` (and keeps the existing instance) if the name
    /// is already registered: a shared name must resolve to the same
    /// instance for the whole application lifetime.
    pub fn register_shared(&self, handle: DependencyHandle) -> bool {
        match self.shared.entry(handle.name().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            },
            Entry::Occupied(_) => {
                warn!(
                    dependency = %handle.name(),
                    "Shared dependency already registered, keeping existing instance"
                );
                false
            },
        }
    }

    /// Build the scope for one load attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Fetch`](crate::LoaderError::Fetch) only
    /// when a v1 requirement manifest cannot be retrieved; every other
    /// miss degrades to [`Resolved::Missing`].
    pub async fn resolve(
        &self,
        kind: ProtocolKind,
        descriptor: &TileDescriptor,
    ) -> LoaderResult<DependencyScope> {
        let mut scope = DependencyScope::default();
        for (name, handle) in &self.framework {
            scope.insert(name.clone(), Resolved::Instance(handle.clone()));
        }

        match kind {
            // Legacy and unknown shapes get the fixed externals only;
            // declared requirements are not honored.
            ProtocolKind::V0 | ProtocolKind::Unknown | ProtocolKind::Bundle => {},
            ProtocolKind::V1 => {
                self.extend_with_shared(&mut scope);
                if let Some(require_ref) = descriptor.require_ref.as_deref() {
                    let declared = self.fetcher.fetch_require_manifest(require_ref).await?;
                    for name in declared {
                        self.insert_shared_or_missing(&mut scope, &descriptor.name, &name);
                    }
                }
            },
            ProtocolKind::V2 => {
                self.extend_with_shared(&mut scope);
                for (name, location) in &descriptor.dependencies {
                    let resolved = self
                        .resolve_remote(&descriptor.name, name, location)
                        .await;
                    scope.insert(name.clone(), resolved);
                }
            },
        }

        debug!(
            tile = %descriptor.name,
            kind = ?kind,
            dependencies = scope.len(),
            "Resolved dependency scope"
        );
        Ok(scope)
    }

    fn extend_with_shared(&self, scope: &mut DependencyScope) {
        for entry in self.shared.iter() {
            scope.insert(entry.key().clone(), Resolved::Instance(entry.value().clone()));
        }
    }

    fn insert_shared_or_missing(&self, scope: &mut DependencyScope, tile: &TileName, name: &str) {
        if scope.get(name).is_some() {
            return;
        }
        if let Some(handle) = self.shared.get(name) {
            scope.insert(name.to_string(), Resolved::Instance(handle.clone()));
        } else {
            self.report_missing(tile, name);
            scope.insert(name.to_string(), Resolved::Missing);
        }
    }

    /// Resolve a URL-addressed shared asset, cached process-wide by
    /// its content hash (the URL's `#` fragment; the bare URL when no
    /// fragment is given). Fetch failure degrades to `Missing`.
    async fn resolve_remote(&self, tile: &TileName, name: &str, location: &str) -> Resolved {
        let (url, cache_key) = match location.split_once('#') {
            Some((url, hash)) if !hash.is_empty() => (url, hash.to_string()),
            _ => (location, location.to_string()),
        };

        if let Some(hit) = self.remote_cache.get(&cache_key) {
            return Resolved::Instance(hit.clone());
        }

        match self.fetcher.fetch_source(url, Some(&cache_key)).await {
            Ok(payload) => {
                let handle = DependencyHandle::new(name, Arc::new(payload));
                // entry() rather than insert(): a concurrent resolve of
                // the same hash must yield the same instance.
                let handle = self
                    .remote_cache
                    .entry(cache_key)
                    .or_insert(handle)
                    .clone();
                Resolved::Instance(handle)
            },
            Err(e) => {
                warn!(
                    tile = %tile,
                    dependency = name,
                    url,
                    error = %e,
                    "Remote shared asset unavailable, resolving as missing"
                );
                self.report_missing(tile, name);
                Resolved::Missing
            },
        }
    }

    fn report_missing(&self, tile: &TileName, name: &str) {
        warn!(
            tile = %tile,
            dependency = name,
            "Declared dependency resolved to nothing"
        );
        self.events.publish(MosaicEvent::DependencyMissing {
            tile: tile.clone(),
            dependency: name.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::TilePayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        require_names: Vec<String>,
        source_fetches: AtomicUsize,
    }

    impl StubFetcher {
        fn new(require_names: &[&str]) -> Self {
            Self {
                require_names: require_names.iter().map(ToString::to_string).collect(),
                source_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TileFetcher for StubFetcher {
        async fn fetch_source(
            &self,
            url: &str,
            _integrity: Option<&str>,
        ) -> LoaderResult<Arc<TilePayload>> {
            self.source_fetches.fetch_add(1, Ordering::SeqCst);
            if url.contains("unreachable") {
                return Err(crate::LoaderError::Fetch {
                    url: url.to_string(),
                    message: "connection refused".into(),
                });
            }
            Ok(Arc::new(TilePayload::new(url.as_bytes().to_vec())))
        }

        async fn fetch_manifest(&self, _url: &str) -> LoaderResult<Vec<TileDescriptor>> {
            Ok(Vec::new())
        }

        async fn fetch_require_manifest(&self, _url: &str) -> LoaderResult<Vec<String>> {
            Ok(self.require_names.clone())
        }
    }

    fn descriptor(name: &str) -> TileDescriptor {
        TileDescriptor::named(TileName::new(name).unwrap())
    }

    fn handle(name: &str) -> DependencyHandle {
        DependencyHandle::new(name, Arc::new(name.to_string()))
    }

    #[tokio::test]
    async fn v0_gets_framework_externals_only() {
        let resolver = DependencyResolver::new(
            Arc::new(StubFetcher::new(&[])),
            EventBus::new(),
        )
        .with_framework(handle("app-router"));
        resolver.register_shared(handle("ui-kit"));

        let scope = resolver
            .resolve(ProtocolKind::V0, &descriptor("legacy"))
            .await
            .unwrap();
        assert!(scope.get("app-router").is_some());
        assert!(scope.get("ui-kit").is_none());
    }

    #[tokio::test]
    async fn v1_combines_shared_and_declared_missing_is_observable() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let resolver =
            DependencyResolver::new(Arc::new(StubFetcher::new(&["ui-kit", "ghost"])), bus);
        resolver.register_shared(handle("ui-kit"));

        let mut desc = descriptor("shop");
        desc.require_ref = Some("/shop.deps.json".into());
        let scope = resolver.resolve(ProtocolKind::V1, &desc).await.unwrap();

        assert!(matches!(scope.get("ui-kit"), Some(Resolved::Instance(_))));
        // Declared but nowhere to be found: missing, not an error.
        assert!(matches!(scope.get("ghost"), Some(Resolved::Missing)));
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type(), "dependency.missing");
    }

    #[tokio::test]
    async fn shared_instances_are_referentially_identical_across_tiles() {
        let resolver =
            DependencyResolver::new(Arc::new(StubFetcher::new(&["ui-kit"])), EventBus::new());
        resolver.register_shared(handle("ui-kit"));

        let mut first = descriptor("a");
        first.require_ref = Some("/a.deps.json".into());
        let mut second = descriptor("b");
        second.require_ref = Some("/b.deps.json".into());

        let scope_a = resolver.resolve(ProtocolKind::V1, &first).await.unwrap();
        let scope_b = resolver.resolve(ProtocolKind::V1, &second).await.unwrap();

        let (Some(Resolved::Instance(ha)), Some(Resolved::Instance(hb))) =
            (scope_a.get("ui-kit"), scope_b.get("ui-kit"))
        else {
            panic!("expected both tiles to resolve ui-kit");
        };
        assert!(ha.same_instance(hb));
    }

    #[tokio::test]
    async fn duplicate_shared_registration_keeps_first_instance() {
        let resolver = DependencyResolver::new(Arc::new(StubFetcher::new(&[])), EventBus::new());
        let first = handle("ui-kit");
        assert!(resolver.register_shared(first.clone()));
        assert!(!resolver.register_shared(handle("ui-kit")));

        let shared = resolver.shared.get("ui-kit").unwrap();
        assert!(shared.same_instance(&first));
    }

    #[tokio::test]
    async fn v2_remote_assets_cached_by_hash() {
        let fetcher = Arc::new(StubFetcher::new(&[]));
        let fetcher_dyn: Arc<dyn TileFetcher> = fetcher.clone();
        let resolver = DependencyResolver::new(fetcher_dyn, EventBus::new());

        let mut desc = descriptor("v2tile");
        desc.link = Some("/v2tile.js".into());
        desc.spec = Some("v2".into());
        desc.dependencies
            .insert("charts".into(), "https://cdn/charts.wasm#abc123".into());

        let scope_a = resolver.resolve(ProtocolKind::V2, &desc).await.unwrap();
        let scope_b = resolver.resolve(ProtocolKind::V2, &desc).await.unwrap();

        // Second resolution is served from the append-only cache.
        assert_eq!(fetcher.source_fetches.load(Ordering::SeqCst), 1);
        let (Some(Resolved::Instance(ha)), Some(Resolved::Instance(hb))) =
            (scope_a.get("charts"), scope_b.get("charts"))
        else {
            panic!("expected charts to resolve in both scopes");
        };
        assert!(ha.same_instance(hb));
    }

    #[tokio::test]
    async fn v2_unreachable_remote_asset_is_missing_not_fatal() {
        let resolver =
            DependencyResolver::new(Arc::new(StubFetcher::new(&[])), EventBus::new());
        let mut desc = descriptor("v2tile");
        desc.dependencies
            .insert("charts".into(), "https://unreachable/charts.wasm".into());

        let scope = resolver.resolve(ProtocolKind::V2, &desc).await.unwrap();
        assert!(matches!(scope.get("charts"), Some(Resolved::Missing)));
    }
}
