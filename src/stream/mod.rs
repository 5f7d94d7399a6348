//! Inbound relay stream
//!
//! Everything between the websocket and the event filter:
//!
//! - **commit**: decoded commit notifications, operations and records
//! - **jetstream**: JSON feed decoder
//! - **connection**: websocket connection, the [`FrameSource`] / [`Connector`]
//!   seams the supervisor drives, and the idempotent [`CloseSignal`]

pub mod commit;
pub mod connection;
pub mod jetstream;

pub use commit::{
    CommitNotification, DecodedRecord, FeedPost, OpAction, Record, RepoOp, StreamFrame,
    FEED_POST_TYPE,
};
pub use connection::{CloseSignal, Connector, FrameSource, WebSocketConnector, WebSocketSource};
pub use jetstream::{decode_frame, DEFAULT_JETSTREAM_URL};

use thiserror::Error;

/// Errors that end a streaming run
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("WebSocket connection failed: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Error frame: {error}: {message}")]
    ErrorFrame { error: String, message: String },

    #[error("Connection timeout")]
    Timeout,

    #[error("Stream ended unexpectedly")]
    Ended,
}
