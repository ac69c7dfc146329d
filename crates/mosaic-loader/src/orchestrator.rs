//! Lifecycle orchestration.
//!
//! Drives classify → fetch → resolve → evaluate → setup for batches of
//! descriptors and the inverse teardown → prune for removal, while
//! owning the set of currently active tiles.
//!
//! Ordering contract: fetching and evaluation run concurrently across
//! a batch, but `setup` is invoked strictly in descriptor input order
//! (completed loads are buffered until their turn), because
//! registration order is externally observable. Per tile name,
//! teardown of a previous instance always completes before the
//! replacement's setup begins, and all add/remove operations are
//! serialized through one lock.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, join_all};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mosaic_core::{HostKind, ProtocolKind, TileDescriptor, TileName, classify};
use mosaic_events::{EventBus, MosaicEvent};

use crate::api::TileApi;
use crate::error::{LoaderError, LoaderResult};
use crate::evaluator::{TileEvaluator, TileInstance, TileSource};
use crate::fetcher::{TileFetcher, TilePayload};
use crate::resolver::{DependencyResolver, DependencyScope};
use crate::state::AppState;

/// A tile that completed fetch + evaluate and awaits setup.
struct Prepared {
    instance: Box<dyn TileInstance>,
    scope: DependencyScope,
}

type PrepareOutcome = Result<Prepared, (TileName, LoaderError)>;

/// An attached tile: the live instance plus its API, held for the
/// whole attached lifetime so teardown receives the same API object.
struct ActiveTile {
    instance: Box<dyn TileInstance>,
    api: TileApi,
}

/// Sequences tile lifecycles and owns the active set.
pub struct Orchestrator {
    host: HostKind,
    fetcher: Arc<dyn TileFetcher>,
    resolver: Arc<DependencyResolver>,
    evaluator: Arc<dyn TileEvaluator>,
    state: Arc<AppState>,
    events: EventBus,
    /// Active tiles by name. The lock is held across setup/teardown,
    /// which serializes concurrent add/remove for the same name.
    active: Mutex<HashMap<TileName, ActiveTile>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        host: HostKind,
        fetcher: Arc<dyn TileFetcher>,
        resolver: Arc<DependencyResolver>,
        evaluator: Arc<dyn TileEvaluator>,
        state: Arc<AppState>,
        events: EventBus,
    ) -> Self {
        Self {
            host,
            fetcher,
            resolver,
            evaluator,
            state,
            events,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// The shared state store tiles register into.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// The reporting bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Load a batch of descriptors.
    ///
    /// Fetch/evaluate run concurrently; setup follows input order.
    /// Per-tile failures are reported on the bus and skipped — this
    /// method itself never fails.
    pub async fn load_all(&self, descriptors: Vec<TileDescriptor>) {
        let count = descriptors.len();
        debug!(count, "Loading tile batch");

        // join_all yields results in argument order regardless of
        // completion order, which is exactly the buffering the setup
        // ordering contract needs.
        let prepared = join_all(
            descriptors
                .into_iter()
                .map(|descriptor| self.prepare_tree(descriptor)),
        )
        .await;

        for outcome in prepared.into_iter().flatten() {
            self.attach_outcome(outcome).await;
        }
    }

    /// Load a single descriptor, replacing any active tile of the same
    /// name (its teardown completes before the new setup starts).
    pub async fn add(&self, descriptor: TileDescriptor) {
        for outcome in self.prepare_tree(descriptor).await {
            self.attach_outcome(outcome).await;
        }
    }

    /// Tear down and remove a tile by name.
    ///
    /// Returns `false` if no such tile is active. A teardown failure
    /// is reported but never blocks removal: afterwards the tile is
    /// absent from the active set either way.
    pub async fn remove(&self, name: &TileName) -> bool {
        let mut active = self.active.lock().await;
        let Some(tile) = active.remove(name) else {
            debug!(tile = %name, "Remove requested for inactive tile");
            return false;
        };
        self.teardown_tile(tile).await;
        self.events
            .publish(MosaicEvent::TileRemoved { name: name.clone() });
        info!(tile = %name, "Removed tile");
        true
    }

    /// Names of the currently active tiles, sorted.
    pub async fn active_tiles(&self) -> Vec<TileName> {
        let active = self.active.lock().await;
        let mut names: Vec<TileName> = active.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a tile is currently active.
    pub async fn is_active(&self, name: &TileName) -> bool {
        self.active.lock().await.contains_key(name)
    }

    /// Classify a descriptor and prepare it, expanding bundles into
    /// their nested descriptors recursively. Output order follows
    /// manifest order.
    fn prepare_tree(&self, descriptor: TileDescriptor) -> BoxFuture<'_, Vec<PrepareOutcome>> {
        Box::pin(async move {
            let kind = classify(&descriptor, self.host);
            match kind {
                ProtocolKind::Bundle => self.prepare_bundle(descriptor).await,
                ProtocolKind::V0
                | ProtocolKind::V1
                | ProtocolKind::V2
                | ProtocolKind::Unknown => {
                    vec![self.prepare_single(kind, descriptor).await]
                },
            }
        })
    }

    async fn prepare_bundle(&self, descriptor: TileDescriptor) -> Vec<PrepareOutcome> {
        let name = descriptor.name.clone();
        let Some(link) = descriptor.link.as_deref() else {
            return vec![Err((
                name,
                LoaderError::NoSource {
                    name: descriptor.name,
                },
            ))];
        };

        let nested = match self.fetcher.fetch_manifest(link).await {
            Ok(nested) => nested,
            Err(e) => return vec![Err((name, e))],
        };

        debug!(bundle = %name, count = nested.len(), "Expanding bundle");
        let outcomes = join_all(nested.into_iter().map(|d| self.prepare_tree(d))).await;
        outcomes.into_iter().flatten().collect()
    }

    async fn prepare_single(
        &self,
        kind: ProtocolKind,
        descriptor: TileDescriptor,
    ) -> PrepareOutcome {
        let name = descriptor.name.clone();
        let result: LoaderResult<Prepared> = async {
            let scope = self.resolver.resolve(kind, &descriptor).await?;
            let payload = self.fetch_payload(&descriptor).await?;
            let source = TileSource {
                meta: descriptor.meta(),
                kind,
                payload,
            };
            let instance = self.evaluator.evaluate(source, scope.clone()).await?;
            Ok(Prepared { instance, scope })
        }
        .await;
        result.map_err(|e| (name, e))
    }

    async fn fetch_payload(&self, descriptor: &TileDescriptor) -> LoaderResult<Arc<TilePayload>> {
        if let Some(content) = &descriptor.content {
            return Ok(Arc::new(TilePayload::new(content.clone().into_bytes())));
        }
        if let Some(link) = descriptor.link.as_deref() {
            return self
                .fetcher
                .fetch_source(link, descriptor.hash.as_deref())
                .await;
        }
        Err(LoaderError::NoSource {
            name: descriptor.name.clone(),
        })
    }

    async fn attach_outcome(&self, outcome: PrepareOutcome) {
        match outcome {
            Ok(prepared) => self.attach(prepared).await,
            Err((name, error)) => self.report_failure(&name, &error),
        }
    }

    /// Run setup for a prepared tile and insert it into the active
    /// set. If a tile of the same name is active, its teardown runs to
    /// completion first.
    async fn attach(&self, prepared: Prepared) {
        let meta = prepared.instance.meta().clone();
        let name = meta.name.clone();

        let mut active = self.active.lock().await;
        if let Some(existing) = active.remove(&name) {
            debug!(tile = %name, "Replacing active tile, tearing down previous instance");
            self.teardown_tile(existing).await;
        }

        let mut api = TileApi::new(
            meta,
            Arc::clone(&self.state),
            self.events.clone(),
            prepared.scope,
        );
        let mut instance = prepared.instance;
        match instance.setup(&mut api).await {
            Ok(()) => {
                info!(tile = %name, "Tile setup complete");
                active.insert(name.clone(), ActiveTile { instance, api });
                self.events.publish(MosaicEvent::TileLoaded { name });
            },
            Err(e) => {
                self.report_failure(&name, &e);
                // Whatever the failed setup managed to register must
                // not outlive it.
                self.state.prune(&name);
            },
        }
    }

    /// Teardown then prune. The API instance drops at the end of this
    /// call, ending the tile's attached lifetime.
    async fn teardown_tile(&self, mut tile: ActiveTile) {
        let name = tile.instance.meta().name.clone();
        if tile.instance.has_teardown() {
            if let Err(e) = tile.instance.teardown(&mut tile.api).await {
                self.report_failure(&name, &e);
            }
        }
        self.state.prune(&name);
    }

    fn report_failure(&self, name: &TileName, error: &LoaderError) {
        warn!(tile = %name, stage = %error.stage(), error = %error, "Tile failed");
        self.events.publish(MosaicEvent::TileFailed {
            name: name.clone(),
            stage: error.stage(),
            error: error.to_string(),
        });
    }
}
