//! Bounded event queue
//!
//! The only hand-off between the producer and the worker. A full queue blocks
//! the producer, which stops reading the websocket; that is the pipeline's
//! backpressure. Closing the sender is the worker's shutdown signal: it drains
//! what is buffered and then sees `None`.

use crate::filter::CandidateEvent;
use crate::metrics;
use thiserror::Error;
use tokio::sync::mpsc;

/// Queue errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// `close` was already called on this sender
    #[error("queue is closed")]
    Closed,

    /// The worker is gone
    #[error("queue receiver dropped")]
    ReceiverGone,
}

/// Create a queue with a fixed capacity
pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueSender { tx: Some(tx) }, QueueReceiver { rx })
}

/// Producer half
#[derive(Debug)]
pub struct QueueSender {
    tx: Option<mpsc::Sender<CandidateEvent>>,
}

impl QueueSender {
    /// Enqueue, waiting while the queue is full
    pub async fn enqueue(&self, event: CandidateEvent) -> Result<(), QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Closed)?;
        tx.send(event).await.map_err(|_| QueueError::ReceiverGone)?;
        metrics::set_queue_depth((tx.max_capacity() - tx.capacity()) as i64);
        Ok(())
    }

    /// Stop accepting events and wake the reader. Safe to call more than once.
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Consumer half
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<CandidateEvent>,
}

impl QueueReceiver {
    /// Next event in FIFO order, waiting while empty; `None` once closed and drained
    pub async fn dequeue(&mut self) -> Option<CandidateEvent> {
        let event = self.rx.recv().await;
        metrics::set_queue_depth(self.rx.len() as i64);
        event
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
