//! Audit stream
//!
//! Every accepted post is echoed to stdout as one JSON line. Writing must never
//! slow down the producer, so lines go through a bounded channel to a writer
//! task and are dropped when it falls behind.

use crate::stream::FeedPost;
use std::io::Write;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Non-blocking handle to the audit writer
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: Option<mpsc::Sender<FeedPost>>,
}

impl AuditSink {
    /// Sink writing to stdout from a background task
    pub fn stdout(buffer: usize) -> (Self, JoinHandle<()>) {
        Self::spawn(buffer, std::io::stdout())
    }

    /// Sink writing to any writer from a background task
    pub fn spawn<W>(buffer: usize, mut out: W) -> (Self, JoinHandle<()>)
    where
        W: Write + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<FeedPost>(buffer.max(1));
        let handle = tokio::spawn(async move {
            while let Some(post) = rx.recv().await {
                if let Err(e) = write_line(&mut out, &post) {
                    warn!(error = %e, "Failed to write audit line");
                }
            }
        });
        (Self { tx: Some(tx) }, handle)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a record for output, dropping it if the writer is behind
    pub fn record(&self, post: &FeedPost) {
        let Some(ref tx) = self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(post.clone()) {
            debug!(error = %e, "Audit line dropped");
        }
    }
}

/// One `write_all` per record, so stdout's lock is held for the whole line
fn write_line<W: Write>(out: &mut W, post: &FeedPost) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(post)?;
    line.push(b'\n');
    out.write_all(&line)?;
    out.flush()
}
