//! Event reporting for the Mosaic host.
//!
//! Per-tile load failures never abort a batch and never surface to the
//! orchestrator's caller; instead every component funnels its reports
//! into the [`EventBus`] defined here. Hosts subscribe to drive
//! diagnostics, error overlays, or a full page reload.

pub mod bus;
pub mod event;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{LoadStage, MosaicEvent};
