//! Transport adapter for a single accepted connection.
//!
//! Wraps an upgraded WebSocket into independent read and write halves so the
//! reader and writer tasks can own one half each.

use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Outgoing half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Incoming half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// A connection whose handshake has already completed.
pub struct Transport {
    sink: FrameSink,
    stream: FrameStream,
}

impl Transport {
    /// Builds a transport from any message sink and stream pair.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Message, Error = WsError> + Send + 'static,
        St: Stream<Item = Result<Message, WsError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Splits an upgraded WebSocket into a transport.
    pub fn from_websocket<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        Self::new(sink, stream)
    }

    pub fn into_split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }

    /// Closes the connection without sending anything else.
    pub async fn close(mut self) {
        let _ = self.sink.close().await;
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}
