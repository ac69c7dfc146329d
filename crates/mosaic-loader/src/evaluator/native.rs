//! Evaluation of statically linked tiles.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use mosaic_core::TileName;

use super::{TileEvaluator, TileInstance, TileSource};
use crate::error::{LoaderError, LoaderResult};
use crate::resolver::DependencyScope;

/// Builds a [`TileInstance`] for a statically linked tile.
pub type TileFactory = Arc<
    dyn Fn(&TileSource, &DependencyScope) -> LoaderResult<Box<dyn TileInstance>> + Send + Sync,
>;

/// Evaluator backed by a registry of in-process factories.
///
/// Hosts register a factory per tile name for tiles compiled into the
/// application itself; the fetched payload is ignored. This is also
/// the evaluation engine tests drive the orchestrator with.
#[derive(Default)]
pub struct NativeEvaluator {
    factories: DashMap<TileName, TileFactory>,
}

impl NativeEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a tile name, replacing any previous one.
    pub fn register(&self, name: TileName, factory: TileFactory) {
        debug!(tile = %name, "Registered native tile factory");
        self.factories.insert(name, factory);
    }
}

#[async_trait]
impl TileEvaluator for NativeEvaluator {
    async fn evaluate(
        &self,
        source: TileSource,
        scope: DependencyScope,
    ) -> LoaderResult<Box<dyn TileInstance>> {
        let Some(factory) = self.factories.get(&source.meta.name) else {
            return Err(LoaderError::Evaluate {
                name: source.meta.name.clone(),
                message: "no native factory registered for this tile".into(),
            });
        };
        factory(&source, &scope)
    }
}
