//! Websocket connection to the relay
//!
//! The supervisor only sees two traits: a [`Connector`] that dials and a
//! [`FrameSource`] that yields decoded frames. Tests substitute both with
//! in-memory feeds.

use super::commit::StreamFrame;
use super::jetstream::decode_frame;
use super::StreamError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Default dial timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A live source of stream frames
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the peer has finished the stream
    async fn next_frame(&mut self) -> Option<Result<StreamFrame, StreamError>>;

    /// Close the underlying connection. Must tolerate repeated calls.
    async fn close(&mut self);
}

/// Opens fresh [`FrameSource`]s
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameSource>, StreamError>;
}

/// Shared, idempotent close request for one connection
///
/// Either the producer (on a decode error) or the watchdog may close; whichever
/// comes first wins and later calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    inner: Arc<CloseInner>,
}

#[derive(Debug, Default)]
struct CloseInner {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request close. Returns true for the call that actually closed.
    pub fn close(&self) -> bool {
        let first = !self.inner.closed.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolves once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// Dials the relay over websocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn FrameSource>, StreamError> {
        info!(url = %self.url, "Connecting to relay");

        let connect_result =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await;

        let (ws, _response) = match connect_result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(StreamError::Connection(e.to_string())),
            Err(_) => return Err(StreamError::Timeout),
        };

        info!(url = %self.url, "Connected to relay");
        Ok(Box::new(WebSocketSource { ws, closed: false }))
    }
}

/// Decoding frame source over a websocket
pub struct WebSocketSource {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn next_frame(&mut self) -> Option<Result<StreamFrame, StreamError>> {
        if self.closed {
            return None;
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(decode_frame(&text)),
                Some(Ok(Message::Binary(data))) => {
                    return Some(Err(StreamError::Decode(format!(
                        "unexpected binary frame ({} bytes)",
                        data.len()
                    ))));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        return Some(Err(StreamError::WebSocket(e.to_string())));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("Relay sent close frame: {:?}", frame);
                    return Some(Err(StreamError::Ended));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(StreamError::WebSocket(e.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "Error while closing relay connection");
        }
    }
}
