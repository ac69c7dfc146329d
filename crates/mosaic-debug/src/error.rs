use mosaic_core::TileName;
use thiserror::Error;

/// Errors of the live-update channel.
#[derive(Debug, Error)]
pub enum DebugError {
    /// WebSocket connection or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The server closed the channel with a close code.
    #[error("Channel closed with code {0}")]
    Closed(u16),
    /// Feed request failed.
    #[error("Feed request failed: {0}")]
    Feed(#[from] reqwest::Error),
    /// An inbound message was not valid JSON of the expected shape.
    #[error("Invalid channel message: {0}")]
    Protocol(#[from] serde_json::Error),
    /// A reload was requested for a tile the feed does not know.
    #[error("Feed has no descriptor for tile {0}")]
    UnknownTile(TileName),
}

/// A specialized Result type for the debug channel.
pub type DebugResult<T> = Result<T, DebugError>;
