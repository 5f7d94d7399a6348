//! Error types for haikubot
//!
//! Each subsystem owns a focused error enum (`StreamError`, `QueueError`,
//! `XrpcError`, `PostError`). `HaikuBotError` wraps them for callers that
//! cross subsystem boundaries. The binary adds context on top with anyhow.

use crate::poster::{PostError, XrpcError};
use crate::queue::QueueError;
use crate::stream::StreamError;
use thiserror::Error;

/// Result type alias for haikubot operations
pub type Result<T> = std::result::Result<T, HaikuBotError>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum HaikuBotError {
    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport errors on the inbound stream
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Event queue errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Errors from the outbound write endpoint
    #[error("XRPC error: {0}")]
    Xrpc(#[from] XrpcError),

    /// Errors from posting a reply
    #[error("Post error: {0}")]
    Post(#[from] PostError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid filter pattern
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl HaikuBotError {
    /// Whether this error should stop the process rather than restart the pipeline
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HaikuBotError::Config(_) | HaikuBotError::Yaml(_) | HaikuBotError::Regex(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(HaikuBotError::Config("HAIKUBOT_PASSWORD is required".into()).is_fatal());
        assert!(!HaikuBotError::Stream(StreamError::Ended).is_fatal());
        assert!(!HaikuBotError::Other("boom".into()).is_fatal());
    }

    #[test]
    fn test_display_wraps_source() {
        let err: HaikuBotError = StreamError::Connection("refused".into()).into();
        assert_eq!(
            err.to_string(),
            "Stream error: WebSocket connection failed: refused"
        );
    }
}
