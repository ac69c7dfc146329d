//! Development-mode live updates for the Mosaic host.
//!
//! Maintains a WebSocket channel to a development server, debounces
//! change notifications per tile name, and drives teardown-then-reload
//! cycles through the orchestrator. A hard-refresh signal bypasses the
//! partial path and requests a full application reload instead.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod feed;

pub use bridge::{DebugBridge, MessageSource};
pub use config::DebugConfig;
pub use connection::{ChangeNotification, DebugConnection, DebugMessage};
pub use error::{DebugError, DebugResult};
pub use feed::{FeedClient, FeedSource};
