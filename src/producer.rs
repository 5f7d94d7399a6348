//! Stream producer
//!
//! Reads frames from the live connection, runs the event filter on each commit
//! and enqueues accepted candidates. A full queue blocks the read loop.

use crate::audit::AuditSink;
use crate::filter::EventFilter;
use crate::metrics;
use crate::queue::QueueSender;
use crate::stream::{CloseSignal, FrameSource, StreamError, StreamFrame};
use crate::{HaikuBotError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Producer half of one pipeline run
#[derive(Debug, Clone)]
pub struct Producer {
    filter: Arc<EventFilter>,
    audit: AuditSink,
}

impl Producer {
    pub fn new(filter: Arc<EventFilter>, audit: AuditSink) -> Self {
        Self { filter, audit }
    }

    /// Read until the stream fails or a close is requested
    ///
    /// Returns `Ok(())` when stopped through `closer`, otherwise the error that
    /// ended the stream. The source is closed either way.
    pub async fn run(
        &self,
        mut source: Box<dyn FrameSource>,
        queue: &QueueSender,
        closer: &CloseSignal,
    ) -> Result<()> {
        let result = self.read_loop(source.as_mut(), queue, closer).await;

        if let Err(ref e) = result {
            info!(error = %e, "Stream stopped");
        }
        closer.close();
        source.close().await;
        result
    }

    async fn read_loop(
        &self,
        source: &mut dyn FrameSource,
        queue: &QueueSender,
        closer: &CloseSignal,
    ) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = closer.closed() => return Ok(()),
                next = source.next_frame() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(StreamError::Ended.into()),
            };
            metrics::record_frame();

            let commit = match frame {
                StreamFrame::Commit(commit) => commit,
                StreamFrame::Error { error, message } => {
                    return Err(StreamError::ErrorFrame { error, message }.into());
                }
                StreamFrame::Info { name, message } => {
                    info!(name = %name, message = %message, "Info frame");
                    continue;
                }
                StreamFrame::Ignored => continue,
            };

            for accepted in self.filter.candidates(&commit) {
                self.audit.record(&accepted.record);
                debug!(
                    seq = commit.seq,
                    author = %accepted.event.author_id,
                    rkey = %accepted.event.record_key,
                    "Candidate"
                );

                tokio::select! {
                    biased;
                    _ = closer.closed() => return Ok(()),
                    sent = queue.enqueue(accepted.event) => {
                        if let Err(e) = sent {
                            if closer.is_closed() {
                                return Ok(());
                            }
                            return Err(HaikuBotError::Queue(e));
                        }
                    }
                }
            }
        }
    }
}
