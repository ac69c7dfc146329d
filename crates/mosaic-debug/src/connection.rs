//! WebSocket connection to the development server.
//!
//! Inbound messages are JSON text. A message carrying a `name` is a
//! change notification for that tile (optionally with fresh descriptor
//! fields); `{"type": "reload"}` is the hard-refresh signal.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use mosaic_core::TileName;

use crate::error::{DebugError, DebugResult};

/// Type alias for the WebSocket stream used by the bridge.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A parsed change notification for one tile.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    /// The tile the notification names.
    pub name: TileName,
    /// The full message payload; may carry fresh descriptor fields.
    pub payload: serde_json::Value,
}

/// A parsed inbound message.
#[derive(Debug, Clone)]
pub enum DebugMessage {
    /// A tile changed; debounce and reload it.
    Changed(ChangeNotification),
    /// Reload the whole application, bypassing the partial path.
    HardRefresh,
}

impl DebugMessage {
    /// Parse an inbound JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Protocol`] when the text is not JSON or
    /// names no tile and is not a hard-refresh signal.
    pub fn parse(text: &str) -> DebugResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("type").and_then(serde_json::Value::as_str) == Some("reload") {
            return Ok(Self::HardRefresh);
        }
        let name: TileName =
            serde_json::from_value(value.get("name").cloned().unwrap_or_default())
                .map_err(DebugError::Protocol)?;
        Ok(Self::Changed(ChangeNotification {
            name,
            payload: value,
        }))
    }
}

/// A live WebSocket connection to the development server.
///
/// Wraps the split read/write halves of a `tokio-tungstenite` stream
/// and provides typed receive for [`DebugMessage`].
pub struct DebugConnection {
    writer: SplitSink<WsStream, Message>,
    reader: SplitStream<WsStream>,
}

impl DebugConnection {
    /// Connect to the given WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns an error on connection or TLS failure.
    pub async fn connect(url: &str) -> DebugResult<Self> {
        let (ws, _response) = connect_async(url).await?;
        let (writer, reader) = ws.split();
        debug!(url, "Connected to development server");
        Ok(Self { writer, reader })
    }

    /// Receive the next debug message.
    ///
    /// Returns `Ok(None)` when the connection ends cleanly; a close
    /// frame from the server surfaces as [`DebugError::Closed`].
    pub async fn recv(&mut self) -> DebugResult<Option<DebugMessage>> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    return DebugMessage::parse(&text).map(Some);
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map_or(1000, |f| f.code.into());
                    return Err(DebugError::Closed(code));
                },
                Some(Ok(
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
                )) => {
                    // Ping/pong handled by tungstenite; binary skipped.
                },
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    /// Send a close frame and shut down the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame cannot be sent.
    pub async fn close(&mut self) -> DebugResult<()> {
        self.writer.send(Message::Close(None)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_notification_parses_name_and_keeps_payload() {
        let msg = DebugMessage::parse(r#"{"name":"shop","link":"/shop.js","spec":"v2"}"#).unwrap();
        let DebugMessage::Changed(change) = msg else {
            panic!("expected change notification");
        };
        assert_eq!(change.name.as_str(), "shop");
        assert_eq!(
            change.payload.get("link").and_then(serde_json::Value::as_str),
            Some("/shop.js")
        );
    }

    #[test]
    fn reload_signal_parses_as_hard_refresh() {
        let msg = DebugMessage::parse(r#"{"type":"reload"}"#).unwrap();
        assert!(matches!(msg, DebugMessage::HardRefresh));
    }

    #[test]
    fn nameless_message_is_a_protocol_error() {
        assert!(DebugMessage::parse(r#"{"kind":"noise"}"#).is_err());
        assert!(DebugMessage::parse("not json").is_err());
    }
}
