//! Scoped tile evaluation.
//!
//! An evaluator turns a fetched payload into a live [`TileInstance`]
//! that can only observe the dependencies in its [`DependencyScope`] —
//! no ambient fallback for names outside the scope. Two engines ship:
//! the sandboxed [`WasmEvaluator`] for payloads delivered over the
//! wire, and the [`NativeEvaluator`] factory registry for statically
//! linked tiles.
//!
//! Evaluation failure (bad module, missing `setup` export) is the
//! "invalid tile" condition: reported per tile, never fatal to
//! siblings.

mod native;
mod wasm;

pub use native::{NativeEvaluator, TileFactory};
pub use wasm::WasmEvaluator;

use std::sync::Arc;

use async_trait::async_trait;

use mosaic_core::{ProtocolKind, TileMeta};

use crate::api::TileApi;
use crate::error::LoaderResult;
use crate::fetcher::TilePayload;
use crate::resolver::DependencyScope;

/// A fetched tile ready for evaluation.
#[derive(Debug, Clone)]
pub struct TileSource {
    /// Static metadata derived from the descriptor.
    pub meta: TileMeta,
    /// The protocol the descriptor was classified under.
    pub kind: ProtocolKind,
    /// The fetched module bytes.
    pub payload: Arc<TilePayload>,
}

/// Turns fetched payloads into live tile instances.
#[async_trait]
pub trait TileEvaluator: Send + Sync {
    /// Evaluate a payload inside the given dependency scope.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Evaluate`](crate::LoaderError::Evaluate)
    /// when the payload is not a valid tile.
    async fn evaluate(
        &self,
        source: TileSource,
        scope: DependencyScope,
    ) -> LoaderResult<Box<dyn TileInstance>>;
}

/// A live, evaluated tile.
///
/// Created by an evaluator, consumed by the orchestrator: `setup` is
/// called exactly once per attachment, `teardown` at most once on
/// removal. Nothing outside the orchestrator holds one of these across
/// lifecycle boundaries.
#[async_trait]
pub trait TileInstance: Send + Sync {
    /// The tile's static metadata.
    fn meta(&self) -> &TileMeta;

    /// Register the tile's contributions through the API.
    ///
    /// # Errors
    ///
    /// A setup failure is reported per tile; the tile does not join
    /// the active set.
    async fn setup(&mut self, api: &mut TileApi) -> LoaderResult<()>;

    /// Unregister side: invoked before the tile's registrations are
    /// pruned. A failure here is reported but never blocks removal.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Teardown`](crate::LoaderError::Teardown)
    /// on failure.
    async fn teardown(&mut self, _api: &mut TileApi) -> LoaderResult<()> {
        Ok(())
    }

    /// Whether the tile declared a teardown entry point.
    fn has_teardown(&self) -> bool {
        false
    }
}
