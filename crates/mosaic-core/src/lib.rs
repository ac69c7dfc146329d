//! Core types for the Mosaic micro-frontend host.
//!
//! Defines the wire-level tile descriptor, the closed set of loading
//! protocol kinds, and the total classification function that maps any
//! descriptor to exactly one kind. Everything here is pure data: the
//! loader crate consumes these types to pick a fetch/evaluate strategy.

pub mod classify;
pub mod descriptor;
pub mod error;
pub mod tile;

pub use classify::{HostKind, ProtocolKind, classify};
pub use descriptor::TileDescriptor;
pub use error::{CoreError, CoreResult};
pub use tile::{TileMeta, TileName};
