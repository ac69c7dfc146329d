//! Tile loading and lifecycle for the Mosaic host.
//!
//! The pipeline is classify → fetch → resolve dependencies → evaluate
//! → setup, driven by the [`Orchestrator`], which owns the set of
//! currently active tiles and guarantees at most one active instance
//! per name. Each stage sits behind a trait seam so hosts (and tests)
//! can swap the network fetcher and the evaluation engine.
//!
//! Per-tile failures are reported on the [`mosaic_events::EventBus`]
//! and never abort sibling loads.

pub mod api;
pub mod error;
pub mod evaluator;
pub mod fetcher;
pub mod orchestrator;
pub mod resolver;
pub mod state;

pub use api::TileApi;
pub use error::{LoaderError, LoaderResult};
pub use evaluator::{TileEvaluator, TileInstance, TileSource};
pub use fetcher::{HttpTileFetcher, TileFetcher, TilePayload};
pub use orchestrator::Orchestrator;
pub use resolver::{DependencyHandle, DependencyResolver, DependencyScope, Resolved};
pub use state::{AppState, ExtensionRegistration, PageRegistration, RefreshFreeze, RefreshGate};
